use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::model::store::MemoryStore` and [`mongodb::Database`]. The store is
/// fresh for every test and seeded with the example elections; when both a
/// client and a store are requested, the client serves from that store. The
/// database is created per test on the server at `db_uri`, with indexes in
/// place, and dropped afterwards even if the test panics.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        let args = TokenStream2::from(args);
        return syn::Error::new(args.span(), "`backend_test` takes no arguments")
            .into_compile_error()
            .into();
    }

    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Reject invalid function signatures and work out what to inject.
    let Injections {
        args: test_args,
        client: has_client,
        store: has_store,
        db: has_db,
    } = match check_sig(&item_fn.sig) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let maybe_client = if has_client {
        quote! {
            let rocket_client = rocket::local::asynchronous::Client::tracked(
                crate::rocket_for_store(std::sync::Arc::new(store.clone())),
            )
            .await
            .unwrap();
        }
    } else {
        TokenStream2::new()
    };

    let maybe_store = if has_store || has_client {
        quote! {
            let store = crate::model::store::MemoryStore::with_examples();
        }
    } else {
        TokenStream2::new()
    };

    let db_setup = if has_db {
        quote! { Some(crate::test_database().await) }
    } else {
        quote! { None }
    };

    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["ballot_backend"], None, None);

            // Setup and cleanup get their own runtime so cleanup still runs
            // after the test's runtime has unwound.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let db: Option<mongodb::Database> = outer_runtime.block_on(async { #db_setup });

            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                    .thread_name("rocket-worker-test-thread")
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .unwrap();

                runtime.block_on(async {
                    #maybe_store
                    #maybe_client
                    #new_name(#(#test_args),*).await;
                });
            }));

            if let Some(db) = db {
                outer_runtime.block_on(db.drop(None)).unwrap();
            }

            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// What a test asked for: the call arguments in declaration order and which
/// dependencies must be set up.
#[derive(Default)]
struct Injections {
    args: Vec<TokenStream2>,
    client: bool,
    store: bool,
    db: bool,
}

/// Ensure the wrapped test is async, map parameters to injected values, and
/// reject unknown parameters.
fn check_sig(sig: &Signature) -> Result<Injections, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut injections = Injections::default();

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                let type_ident = type_path.path.segments.last().map(|s| &s.ident);
                match type_ident {
                    Some(ident) if ident == "Client" => {
                        if injections.client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                            ));
                        }
                        injections.client = true;
                        injections.args.push(quote! { rocket_client });
                        continue;
                    }
                    Some(ident) if ident == "MemoryStore" => {
                        if injections.store {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `MemoryStore`",
                            ));
                        }
                        injections.store = true;
                        injections.args.push(quote! { store.clone() });
                        continue;
                    }
                    Some(ident) if ident == "Database" => {
                        if injections.db {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `mongodb::Database`",
                            ));
                        }
                        injections.db = true;
                        injections.args.push(quote! { db.clone().unwrap() });
                        continue;
                    }
                    _ => {}
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `store_ident: MemoryStore` or `db_ident: Database`",
        ));
    }

    Ok(injections)
}
