use proc_macro::TokenStream as TokenStream1;
use proc_macro2::TokenStream;
use quote::quote;
use syn::*;

pub fn service(_args: TokenStream1, input: TokenStream1) -> TokenStream1 {
    let mut input = parse_macro_input!(input as ItemImpl);
    service2(&mut input)
        .unwrap_or_else(|e| {
            let ce = e.into_compile_error();
            quote! { #input #ce }
        })
        .into()
}

fn service2(input: &mut ItemImpl) -> Result<TokenStream> {
    let service_name = service_name(&input.self_ty)?;
    let calls = collect_rpc_fns(input)?;
    let service_impl = gen_service_impl(input, &service_name, &calls);
    Ok(quote! {
        #input
        #service_impl
    })
}

/// The last path segment of the self type, e.g. `Arith` for `crate::math::Arith`.
fn service_name(self_ty: &Type) -> Result<String> {
    match self_ty {
        Type::Path(path) => match path.path.segments.last() {
            Some(seg) => Ok(seg.ident.to_string()),
            None => Err(Error::new_spanned(self_ty, "expected a named type")),
        },
        _ => Err(Error::new_spanned(
            self_ty,
            "#[service] can only be applied to an impl of a named type",
        )),
    }
}

/// Find eligible methods and remove `#[rpc]` attributes.
fn collect_rpc_fns(input: &mut ItemImpl) -> Result<Vec<RpcFn>> {
    let mut fns = Vec::new();
    for item in &mut input.items {
        let method = match item {
            ImplItem::Method(m) => m,
            _ => continue,
        };
        let rpc_attr = take_attribute(&mut method.attrs, "rpc");
        match RpcFn::from_method(method) {
            Some(mut f) => {
                if let Some(attr) = rpc_attr {
                    if let Some(name) = parse_rename(&attr)? {
                        f.rpc_name = name;
                    }
                }
                fns.push(f);
            }
            None => {
                if let Some(attr) = rpc_attr {
                    return Err(Error::new_spanned(
                        attr,
                        "#[rpc] method must be `pub fn(&self, args: A, reply: &mut R)`",
                    ));
                }
            }
        }
    }
    Ok(fns)
}

/// Generate the `Service` impl.
fn gen_service_impl(input: &ItemImpl, service_name: &str, calls: &[RpcFn]) -> TokenStream {
    let self_ty = &input.self_ty;
    let (impl_generics, _, where_clause) = input.generics.split_for_impl();
    let bodys = calls.iter().map(|f| {
        let name = &f.name;
        let rpc_name = &f.rpc_name;
        let arg_ty = &f.arg_ty;
        let reply_ty = &f.reply_ty;
        let args = if f.arg_by_ref {
            quote!(&args)
        } else {
            quote!(args)
        };
        quote! {
            let builder = {
                let this = ::std::sync::Arc::clone(&self);
                builder.method(#rpc_name, move |args: #arg_ty, reply: &mut #reply_ty| {
                    this.#name(#args, reply)
                })
            };
        }
    });
    quote! {
        impl #impl_generics ::simrpc::Service for #self_ty #where_clause {
            fn service_table(self: ::std::sync::Arc<Self>) -> ::simrpc::ServiceTable {
                let builder = ::simrpc::ServiceTable::builder(#service_name);
                #(#bodys)*
                builder.build()
            }
        }
    }
}

/// Find and remove attribute with specific `path`.
fn take_attribute(attrs: &mut Vec<Attribute>, path: &str) -> Option<Attribute> {
    attrs
        .iter()
        .position(|attr| {
            attr.path
                .get_ident()
                .map(|ident| ident == path)
                .unwrap_or(false)
        })
        .map(|idx| attrs.remove(idx))
}

/// Parse `#[rpc(name = "...")]`. A bare `#[rpc]` keeps the method name.
fn parse_rename(attr: &Attribute) -> Result<Option<String>> {
    if attr.tokens.is_empty() {
        return Ok(None);
    }
    let list = match attr.parse_meta()? {
        Meta::List(list) => list,
        meta => {
            return Err(Error::new_spanned(
                meta,
                r#"the correct syntax is #[rpc(name = "...")]"#,
            ))
        }
    };
    let mut rename = None;
    for nested in &list.nested {
        match nested {
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => match &nv.lit {
                Lit::Str(s) => rename = Some(s.value()),
                lit => return Err(Error::new_spanned(lit, "expected a string literal")),
            },
            other => {
                return Err(Error::new_spanned(
                    other,
                    r#"unknown argument, expected `name = "..."`"#,
                ))
            }
        }
    }
    Ok(rename)
}

/// Useful information of an RPC function.
struct RpcFn {
    name: Ident,
    rpc_name: String,
    arg_ty: Type,
    arg_by_ref: bool,
    reply_ty: Type,
}

impl RpcFn {
    /// Returns `None` if the method doesn't look like a handler.
    fn from_method(method: &ImplItemMethod) -> Option<Self> {
        if !matches!(method.vis, Visibility::Public(_)) {
            return None;
        }
        let sig = &method.sig;
        if sig.asyncness.is_some()
            || sig.unsafety.is_some()
            || !sig.generics.params.is_empty()
            || sig.inputs.len() != 3
            || !matches!(sig.output, ReturnType::Default)
        {
            return None;
        }
        let mut inputs = sig.inputs.iter();
        match inputs.next()? {
            FnArg::Receiver(recv) if recv.reference.is_some() && recv.mutability.is_none() => {}
            _ => return None,
        }
        let (arg_ty, arg_by_ref) = match inputs.next()? {
            FnArg::Typed(pat) => match &*pat.ty {
                Type::Reference(r) if r.mutability.is_some() => return None,
                Type::Reference(r) => ((*r.elem).clone(), true),
                ty => (ty.clone(), false),
            },
            _ => return None,
        };
        let reply_ty = match inputs.next()? {
            FnArg::Typed(pat) => match &*pat.ty {
                Type::Reference(r) if r.mutability.is_some() => (*r.elem).clone(),
                _ => return None,
            },
            _ => return None,
        };
        Some(RpcFn {
            name: sig.ident.clone(),
            rpc_name: sig.ident.to_string(),
            arg_ty,
            arg_by_ref,
            reply_ty,
        })
    }
}
