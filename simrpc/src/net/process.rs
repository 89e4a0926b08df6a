use super::{network::EndInfo, Network};
use crate::message::{ReplyMsg, ReqMsg};
use std::{sync::atomic::Ordering, time::Duration};
use tokio::{sync::oneshot, task::JoinError, time::sleep};
use tracing::*;

impl Network {
    /// Deliver exactly one reply for `msg`.
    pub(super) async fn process_req(self, msg: ReqMsg) {
        let ReqMsg { request, reply_tx } = msg;
        let config = &self.core.config;
        let EndInfo {
            enabled,
            server_name,
            dest,
            reliable,
            long_delays,
            long_reordering,
        } = self.core.state.lock().end_info(&request.endname);

        let (server_name, (id, server)) = match (enabled, server_name, dest) {
            (true, Some(name), Some(dest)) => (name, dest),
            _ => {
                // simulate no reply and eventual timeout
                let max = if long_delays {
                    config.max_long_no_route_delay
                } else {
                    config.max_no_route_delay
                };
                let delay = self.rand_delay(max);
                debug!(?request, ?delay, "no route");
                sleep(delay).await;
                send(reply_tx, ReplyMsg::failed());
                return;
            }
        };

        if !reliable {
            // short delay
            sleep(self.rand_delay(config.max_jitter)).await;
            if self.core.rand.gen_bool(config.request_loss_rate) {
                debug!(?request, "drop request");
                send(reply_tx, ReplyMsg::failed());
                return;
            }
        }

        // methods are synchronous and may block
        let endname = request.endname.clone();
        let svc_meth = request.svc_meth.clone();
        let mut handle = tokio::task::spawn_blocking(move || server.dispatch(&request));

        // wait for the reply, or for the server to go away
        let result = loop {
            tokio::select! {
                result = &mut handle => break Some(result),
                _ = sleep(config.liveness_interval) => {
                    if self.is_server_dead(&endname, &server_name, id) {
                        break None;
                    }
                }
            }
        };
        let reply = match result {
            Some(Ok(reply)) => reply,
            Some(Err(e)) => {
                error!(%svc_meth, server = %server_name, "dispatch failed: {e}");
                // the caller sees its reply channel closed
                drop(reply_tx);
                resume_panic(e);
                return;
            }
            None => {
                debug!(%svc_meth, server = %server_name, "server died during call");
                // let the invocation finish and throw the reply away
                tokio::spawn(async move {
                    if let Err(e) = handle.await {
                        error!(%svc_meth, "dispatch failed after the server died: {e}");
                    }
                });
                send(reply_tx, ReplyMsg::failed());
                return;
            }
        };

        if self.is_server_dead(&endname, &server_name, id) {
            debug!(%svc_meth, server = %server_name, "server died before replying");
            send(reply_tx, ReplyMsg::failed());
        } else if !reliable && self.core.rand.gen_bool(config.reply_loss_rate) {
            debug!(%svc_meth, "drop reply");
            send(reply_tx, ReplyMsg::failed());
        } else if long_reordering && self.core.rand.gen_bool(config.reorder_rate) {
            // delay the response for a while
            let max_extra = config.reorder_max_extra.as_millis() as u64;
            let upper = 1 + self.core.rand.gen_range(0..max_extra);
            let delay = config.reorder_min_delay
                + Duration::from_millis(self.core.rand.gen_range(0..upper));
            trace!(%svc_meth, ?delay, "reorder reply");
            tokio::spawn(async move {
                sleep(delay).await;
                self.deliver(reply_tx, reply);
            });
        } else {
            self.deliver(reply_tx, reply);
        }
    }

    fn is_server_dead(&self, endname: &str, server_name: &str, id: u64) -> bool {
        self.core
            .state
            .lock()
            .is_server_dead(endname, server_name, id)
    }

    /// A uniform delay in `[0, max)` with millisecond granularity.
    fn rand_delay(&self, max: Duration) -> Duration {
        Duration::from_millis(self.core.rand.gen_range(0..max.as_millis() as u64))
    }

    fn deliver(&self, reply_tx: oneshot::Sender<ReplyMsg>, reply: ReplyMsg) {
        self.core
            .total_bytes
            .fetch_add(reply.reply.len() as u64, Ordering::Relaxed);
        send(reply_tx, reply);
    }
}

fn send(reply_tx: oneshot::Sender<ReplyMsg>, reply: ReplyMsg) {
    if reply_tx.send(reply).is_err() {
        trace!("caller is gone, reply discarded");
    }
}

/// Re-raise a panic from a dispatch on the task that awaited it.
fn resume_panic(e: JoinError) {
    if let Ok(payload) = e.try_into_panic() {
        std::panic::resume_unwind(payload);
    }
}
