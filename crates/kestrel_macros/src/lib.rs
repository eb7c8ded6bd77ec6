use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat, Type};

/// Time a function when the calling crate's `perf_stats` feature is enabled.
///
/// The body is wrapped with a drop guard that measures wall-clock time and
/// logs through `bevy::log::info!` on exit. Without `perf_stats` the guard is
/// compiled out entirely.
///
/// - Methods (anything taking `self`) are labelled `Type::method`, using
///   `std::any::type_name::<Self>()` with the module path stripped.
/// - A `tick: u64` parameter makes the guard also log every 100th tick,
///   regardless of duration.
/// - The optional argument is the threshold in milliseconds (default 1).
///
/// # Example
/// ```ignore
/// impl RequestScheduler {
///     #[profile(2)]
///     pub fn tick(&mut self, grid: &NavGrid, solver: &mut PathSolver) -> TickStats {
///         // ...
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        attr.to_string().trim().parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let has_receiver = sig
        .inputs
        .iter()
        .any(|arg| matches!(arg, FnArg::Receiver(_)));

    let has_tick_param = sig.inputs.iter().any(|arg| {
        let FnArg::Typed(pat_type) = arg else {
            return false;
        };
        let Pat::Ident(pat_ident) = &*pat_type.pat else {
            return false;
        };
        if pat_ident.ident != "tick" {
            return false;
        }
        match &*pat_type.ty {
            Type::Path(path) => path.path.is_ident("u64"),
            _ => false,
        }
    });

    let owner = if has_receiver {
        quote! {
            {
                let full = ::std::any::type_name::<Self>();
                let base = full.split('<').next().unwrap_or(full);
                base.rsplit("::").next().unwrap_or(base)
            }
        }
    } else {
        quote! { "" }
    };

    let tick_value = if has_tick_param {
        quote! { Some(tick) }
    } else {
        quote! { None }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                struct ProfileGuard {
                    owner: &'static str,
                    name: &'static str,
                    tick: Option<u64>,
                    start: ::std::time::Instant,
                }
                impl Drop for ProfileGuard {
                    fn drop(&mut self) {
                        let elapsed = self.start.elapsed();
                        let on_interval = self.tick.map_or(false, |t| t % 100 == 0);
                        if elapsed.as_millis() > #threshold_ms || on_interval {
                            if self.owner.is_empty() {
                                bevy::log::info!("[PERF] {}: {:?}", self.name, elapsed);
                            } else {
                                bevy::log::info!("[PERF] {}::{}: {:?}", self.owner, self.name, elapsed);
                            }
                        }
                    }
                }
                ProfileGuard {
                    owner: #owner,
                    name: #fn_name_str,
                    tick: #tick_value,
                    start: ::std::time::Instant::now(),
                }
            };

            #block
        }
    };

    output.into()
}
