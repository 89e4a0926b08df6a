//! Macros for use with simrpc.

mod service;

use proc_macro::TokenStream;

/// Builds a service table from the eligible methods of an `impl` block.
///
/// A method is registered iff it is `pub`, not `async`, has no generic
/// parameters, takes `&self`, exactly one argument (by value or by shared
/// reference) and exactly one `&mut` result slot, and returns nothing.
/// Everything else in the block is left alone, so helpers can live next to
/// the handlers.
///
/// The service is named after the self type. An eligible method may be
/// renamed with `#[rpc(name = "...")]`.
///
/// # Example
///
/// ```ignore
/// struct Arith;
///
/// #[simrpc::service]
/// impl Arith {
///     #[rpc(name = "Multiply")]
///     pub fn multiply(&self, args: (i64, i64), reply: &mut i64) {
///         *reply = args.0 * args.1;
///     }
///
///     // not registered: private
///     fn helper(&self, _x: i64, _reply: &mut i64) {}
/// }
///
/// let table = simrpc::register(Arith);
/// assert_eq!(table.name(), "Arith");
/// ```
#[proc_macro_attribute]
pub fn service(args: TokenStream, input: TokenStream) -> TokenStream {
    service::service(args, input)
}
