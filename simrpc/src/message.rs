//! Messages carried by the network.

use crate::{Error, Result};
use bytes::Bytes;
use std::{fmt, sync::Arc};
use tokio::sync::oneshot;

/// A call as seen by a dispatcher.
#[derive(Clone)]
pub struct Request {
    /// Name of the sending endpoint.
    pub endname: Arc<str>,
    /// Qualified method name, e.g. `"Raft.AppendEntries"`.
    pub svc_meth: String,
    /// Declared type of the argument. The payload itself is untyped.
    pub args_type: &'static str,
    /// Encoded argument.
    pub args: Bytes,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("endname", &self.endname)
            .field("svc_meth", &self.svc_meth)
            .field("args_type", &self.args_type)
            .field("len", &self.args.len())
            .finish()
    }
}

/// A request in flight together with its private reply channel.
///
/// The sender is moved out exactly once, so at most one reply can be sent.
pub(crate) struct ReqMsg {
    pub request: Request,
    pub reply_tx: oneshot::Sender<ReplyMsg>,
}

/// The outcome of a call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyMsg {
    /// Whether the call reached a live destination and returned.
    pub ok: bool,
    /// Encoded result. Empty on failure.
    pub reply: Bytes,
}

impl ReplyMsg {
    /// A successful reply.
    pub fn ok(reply: Bytes) -> Self {
        ReplyMsg { ok: true, reply }
    }

    /// A failed reply.
    pub fn failed() -> Self {
        ReplyMsg {
            ok: false,
            reply: Bytes::new(),
        }
    }
}

/// Split `"Service.Method"` on the final `.`.
pub fn split_svc_meth(svc_meth: &str) -> Result<(&str, &str)> {
    match svc_meth.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < svc_meth.len() => {
            Ok((&svc_meth[..dot], &svc_meth[dot + 1..]))
        }
        _ => Err(Error::MalformedName(svc_meth.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split() {
        assert_eq!(
            split_svc_meth("Raft.AppendEntries").unwrap(),
            ("Raft", "AppendEntries")
        );
        assert_eq!(split_svc_meth("kv.v2.Get").unwrap(), ("kv.v2", "Get"));
        assert!(split_svc_meth("Raft").is_err());
        assert!(split_svc_meth(".Get").is_err());
        assert!(split_svc_meth("Raft.").is_err());
    }
}
