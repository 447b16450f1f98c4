//! `#[traced]`: enter/exit trace events for functions, with optional timing
//! and an optional `tracing::instrument` pass-through.
//!
//! ```ignore
//! #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
//! async fn claim(&self) -> Result<Option<Claimed>> { ... }
//! ```

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::{ToTokens, quote, quote_spanned};
use syn::{ItemFn, Stmt, parse::Parse, parse_macro_input, parse_quote};

#[derive(PartialEq, Eq, Clone, Copy, Default)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
    Unspecified,
}

impl Precision {
    /// A closure expression turning an elapsed `Duration` into a display string
    fn formatter(self) -> syn::Expr {
        match self {
            Self::Nanos => {
                parse_quote!(|d: std::time::Duration| format!("{} ns elapsed", d.as_nanos()))
            }
            Self::Micros => {
                parse_quote!(|d: std::time::Duration| format!("{} us elapsed", d.as_micros()))
            }
            Self::Millis => {
                parse_quote!(|d: std::time::Duration| format!("{} ms elapsed", d.as_millis()))
            }
            Self::Seconds => {
                parse_quote!(|d: std::time::Duration| format!("{} s elapsed", d.as_secs()))
            }
            Self::Unspecified => parse_quote!(|_: std::time::Duration| String::default()),
        }
    }
}

impl From<&str> for Precision {
    fn from(value: &str) -> Self {
        match value {
            "ns" | "nano" | "nanos" | "nanoseconds" => Self::Nanos,
            "us" | "micro" | "micros" | "microseconds" => Self::Micros,
            "ms" | "milli" | "millis" | "milliseconds" => Self::Millis,
            "s" | "sec" | "secs" | "seconds" => Self::Seconds,
            _ => Self::Unspecified,
        }
    }
}

impl Parse for Precision {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        if !input.peek(syn::token::Paren) {
            return Ok(Self::default());
        }

        let content;
        let _ = syn::parenthesized!(content in input);
        let _ = content.parse::<keywords::precision>()?;
        let _ = content.parse::<syn::Token![=]>()?;
        let precision = content.parse::<syn::LitStr>()?.value();

        Ok(Self::from(precision.as_str()))
    }
}

#[derive(Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
    warnings: Vec<syn::Error>,
}

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
}

impl Attributes {
    fn warnings(&self) -> impl ToTokens + use<> {
        let warnings = self.warnings.iter().map(|err| {
            let msg = format!("found unrecognized input, {err}");
            let msg = syn::LitStr::new(&msg, err.span());

            quote_spanned! {err.span()=>
                #[warn(deprecated)]
                {
                    #[deprecated(since = "not actually deprecated", note = #msg)]
                    const TRACED_WARNING: () = ();
                    let () = TRACED_WARNING;
                }
            }
        });

        quote! {
            { #(#warnings)* }
        }
    }
}

impl Parse for Attributes {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut attributes = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::timing) {
                if attributes.timing.is_some() {
                    return Err(input.error("expected only a single `timing` argument"));
                }

                let _ = input.parse::<keywords::timing>()?;
                attributes.timing = Some(input.parse()?);
            } else if lookahead.peek(keywords::instrument) {
                if attributes.instrument.is_some() {
                    return Err(input.error("expected only a single `instrument` argument"));
                }

                let _ = input.parse::<keywords::instrument>()?;
                if input.peek(syn::token::Paren) {
                    let content;
                    let _ = syn::parenthesized!(content in input);
                    attributes.instrument = Some(content.parse()?);
                } else {
                    attributes.instrument = Some(TokenStream::new());
                }
            } else if lookahead.peek(syn::Token![,]) {
                let _ = input.parse::<syn::Token![,]>()?;
            } else {
                attributes.warnings.push(lookahead.error());
                let _ = input.parse::<proc_macro2::TokenTree>();
            }
        }

        Ok(attributes)
    }
}

/// Emits `tracing::trace!` events when the attributed function is entered and
/// when it returns (including early returns and unwinding).
///
/// * `instrument(...)` forwards its arguments to `#[tracing::instrument]`.
/// * `timing(precision = "ms")` appends the elapsed time to the exit event.
///
/// # Panics
///
/// When applied to anything other than a function.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(args as Attributes);
    let warnings = args.warnings();

    let mut item_fn = parse_macro_input!(item as ItemFn);

    item_fn
        .attrs
        .push(parse_quote! { #[allow(clippy::items_after_statements)] });

    if let Some(fields) = args.instrument {
        item_fn
            .attrs
            .push(parse_quote! { #[tracing::instrument(#fields)] });
    }

    let id = item_fn.sig.ident.to_string();
    let exit: Stmt = match args.timing {
        None => parse_quote! { tracing::trace!("OnExit: {}", #id); },
        Some(precision) => {
            let formatter = precision.formatter();
            parse_quote! {
                tracing::trace!("OnExit: {} ({})", #id, (#formatter)(self.timer.elapsed()));
            }
        }
    };

    let decl: Vec<Stmt> = parse_quote! {
        #[allow(dead_code)]
        struct __Traced {
            timer: std::time::Instant,
        }

        impl __Traced {
            fn enter() -> Self {
                #warnings

                tracing::trace!("OnEnter: {}", #id);
                Self {
                    timer: std::time::Instant::now(),
                }
            }
        }

        impl std::ops::Drop for __Traced {
            fn drop(&mut self) {
                #exit
            }
        }

        let __traced = __Traced::enter();
    };

    let body = std::mem::take(&mut item_fn.block.stmts);
    item_fn.block.stmts = decl.into_iter().chain(body).collect();

    quote! { #item_fn }.into()
}
