//! Service tables: name-indexed, type-erased method dispatch.
//!
//! A [`ServiceTable`] is built once when an object is registered and never
//! changes afterwards. Each entry knows how to decode its argument, invoke
//! the method with a zero-valued result slot, and encode the result.
//!
//! Tables are usually produced by the [`service`](crate::service) attribute,
//! which inspects an `impl` block and registers every method shaped like
//! `pub fn name(&self, args: A, reply: &mut R)`. The same table can be built
//! by hand with [`ServiceTable::builder`].

use crate::{
    codec,
    message::{ReplyMsg, Request},
    Result,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::{any::type_name, collections::HashMap, fmt::Debug, sync::Arc};
use tracing::*;

/// A value that can be an RPC argument or result.
pub trait Message: Debug + Serialize + DeserializeOwned + Send + 'static {}

impl<T: Debug + Serialize + DeserializeOwned + Send + 'static> Message for T {}

/// An object whose methods can be called remotely.
///
/// Implemented by the [`service`](crate::service) attribute.
pub trait Service: Send + Sync + 'static {
    /// Build the dispatch table of this object.
    fn service_table(self: Arc<Self>) -> ServiceTable;
}

/// Register an object, returning its dispatch table.
pub fn register<S: Service>(service: S) -> ServiceTable {
    Arc::new(service).service_table()
}

type Handler = Box<dyn Fn(&[u8]) -> Result<Bytes> + Send + Sync>;

/// An invocable method.
pub struct MethodDesc {
    arg_type: &'static str,
    reply_type: &'static str,
    handler: Handler,
}

impl MethodDesc {
    /// Declared type of the argument.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Declared type of the result slot.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }
}

/// The dispatch table of one registered object.
pub struct ServiceTable {
    name: String,
    methods: HashMap<String, MethodDesc>,
}

impl ServiceTable {
    /// Start building a table named `name`.
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// The service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of all methods, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the method named `name`.
    pub fn method(&self, name: &str) -> Option<&MethodDesc> {
        self.methods.get(name)
    }

    /// Returns whether the table has a method named `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Invoke `method` with the payload of `req`.
    ///
    /// An argument that fails to decode yields a failed reply.
    ///
    /// # Panics
    ///
    /// Panics if the method doesn't exist, or if the request declares an
    /// argument type other than the one the method takes. Both are deployment
    /// mismatches, not transient faults.
    pub fn dispatch(&self, method: &str, req: &Request) -> ReplyMsg {
        let Some(desc) = self.methods.get(method) else {
            panic!(
                "ServiceTable::dispatch(): unknown method {method} in {}; expecting one of {:?}",
                req.svc_meth,
                self.method_names()
            );
        };
        if req.args_type != desc.arg_type {
            panic!(
                "ServiceTable::dispatch(): argument type mismatch in {}: expecting {}, got {}",
                req.svc_meth, desc.arg_type, req.args_type
            );
        }
        match (desc.handler)(&req.args) {
            Ok(reply) => ReplyMsg::ok(reply),
            Err(e) => {
                warn!(svc_meth = %req.svc_meth, "failed to decode argument: {e}");
                ReplyMsg::failed()
            }
        }
    }
}

impl Debug for ServiceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTable")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Builder of a [`ServiceTable`].
pub struct ServiceBuilder {
    name: String,
    methods: HashMap<String, MethodDesc>,
}

impl ServiceBuilder {
    /// Add a method. A later method with the same name replaces the earlier one.
    ///
    /// The result slot handed to `f` starts as `R::default()`.
    pub fn method<A, R, F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        A: Message,
        R: Message + Default,
        F: Fn(A, &mut R) + Send + Sync + 'static,
    {
        let handler = move |bytes: &[u8]| -> Result<Bytes> {
            let args: A = codec::decode(bytes)?;
            let mut reply = R::default();
            f(args, &mut reply);
            let reply = codec::encode(&reply).unwrap_or_else(|e| {
                panic!("failed to encode reply of type {}: {e}", type_name::<R>())
            });
            Ok(reply)
        };
        self.methods.insert(
            name.into(),
            MethodDesc {
                arg_type: type_name::<A>(),
                reply_type: type_name::<R>(),
                handler: Box::new(handler),
            },
        );
        self
    }

    /// Finish the table.
    pub fn build(self) -> ServiceTable {
        debug!(service = %self.name, methods = self.methods.len(), "build service table");
        ServiceTable {
            name: self.name,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn request<A: Message>(svc_meth: &str, args: &A) -> Request {
        Request {
            endname: "end".into(),
            svc_meth: svc_meth.into(),
            args_type: type_name::<A>(),
            args: codec::encode(args).unwrap(),
        }
    }

    struct Shapes;

    #[service]
    #[allow(dead_code)]
    impl Shapes {
        pub fn foo(&self, x: i32, reply: &mut i32) {
            *reply = x + 1;
        }

        fn bar(&self, x: i32, reply: &mut i32) {
            *reply = x;
        }

        pub fn baz(&self, x: i32, y: i32, reply: &mut i32) {
            *reply = x + y;
        }

        pub fn qux(&self, x: i32) -> i32 {
            x
        }

        pub fn by_ref(&self, x: &String, reply: &mut usize) {
            *reply = x.len();
        }

        #[rpc(name = "Renamed")]
        pub fn renamed(&self, _x: (), reply: &mut bool) {
            *reply = true;
        }
    }

    #[test]
    fn only_eligible_methods() {
        let table = register(Shapes);
        assert_eq!(table.name(), "Shapes");
        assert_eq!(table.method_names(), vec!["Renamed", "by_ref", "foo"]);
        assert!(!table.contains("bar"));
        assert!(!table.contains("baz"));
        assert!(!table.contains("qux"));

        let foo = table.method("foo").unwrap();
        assert_eq!(foo.arg_type(), "i32");
        assert_eq!(foo.reply_type(), "i32");
    }

    #[test]
    fn dispatch() {
        let table = register(Shapes);
        let reply = table.dispatch("foo", &request("Shapes.foo", &41i32));
        assert!(reply.ok);
        assert_eq!(codec::decode::<i32>(&reply.reply).unwrap(), 42);

        let reply = table.dispatch("by_ref", &request("Shapes.by_ref", &"four".to_string()));
        assert_eq!(codec::decode::<usize>(&reply.reply).unwrap(), 4);

        let reply = table.dispatch("Renamed", &request("Shapes.Renamed", &()));
        assert!(codec::decode::<bool>(&reply.reply).unwrap());
    }

    #[test]
    fn undecodable_argument() {
        let table = register(Shapes);
        let mut req = request("Shapes.foo", &1i32);
        req.args = Bytes::from_static(&[1]);
        assert_eq!(table.dispatch("foo", &req), ReplyMsg::failed());
    }

    #[test]
    #[should_panic(expected = "argument type mismatch in Shapes.foo")]
    fn argument_type_mismatch() {
        let table = register(Shapes);
        table.dispatch("foo", &request("Shapes.foo", &1u64));
    }

    #[test]
    #[should_panic(expected = "unknown method bar")]
    fn unknown_method() {
        let table = register(Shapes);
        table.dispatch("bar", &request("Shapes.bar", &1i32));
    }

    #[test]
    fn builder() {
        let hits = Arc::new(AtomicU64::new(0));
        let hits0 = hits.clone();
        let table = ServiceTable::builder("Counter")
            .method("Add", move |n: u64, total: &mut u64| {
                *total = hits0.fetch_add(n, Ordering::SeqCst) + n;
            })
            .method("Get", |_: (), reply: &mut Vec<u8>| {
                reply.push(7);
            })
            .build();
        assert_eq!(table.method_names(), vec!["Add", "Get"]);

        let reply = table.dispatch("Add", &request("Counter.Add", &5u64));
        assert_eq!(codec::decode::<u64>(&reply.reply).unwrap(), 5);
        let reply = table.dispatch("Add", &request("Counter.Add", &2u64));
        assert_eq!(codec::decode::<u64>(&reply.reply).unwrap(), 7);
        assert_eq!(hits.load(Ordering::SeqCst), 7);

        let reply = table.dispatch("Get", &request("Counter.Get", &()));
        assert_eq!(codec::decode::<Vec<u8>>(&reply.reply).unwrap(), vec![7]);
    }
}
