use proc_macro::{Span, TokenStream};
use darling::ast::NestedMeta;
use darling::FromMeta;
use quote::quote;
use syn::{ItemFn, parse_macro_input};


#[derive(Debug, FromMeta)]
struct TestArgsArg {
    vendor: String,
}

impl TestArgsArg {
    fn get_mod_part_name(&self) -> Result<&'static str, darling::Error> {
        match self.vendor.as_str() {
            "postgres" => Ok("postgres"),
            "mysql" => Ok("mysql"),
            "sqlite" => Ok("sqlite"),
            other => Err(darling::Error::custom(format!("Unknown vendor '{}', expected postgres, mysql or sqlite", other))),
        }
    }

    fn get_vendor_variant(&self) -> Result<proc_macro2::TokenStream, darling::Error> {
        match self.get_mod_part_name()? {
            "postgres" => Ok(quote! { crate::Vendor::Postgres }),
            "mysql" => Ok(quote! { crate::Vendor::MySql }),
            _ => Ok(quote! { crate::Vendor::Sqlite }),
        }
    }
}

#[derive(Debug, FromMeta)]
struct TestArgs {
    #[darling(multiple, rename = "arg")]
    args: Vec<TestArgsArg>,
}

impl TestArgs {
    fn get_module_name(&self) -> Result<String, darling::Error> {
        let mut s = String::new();

        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                s.push('_');
            }

            s.push_str(arg.get_mod_part_name()?);
        }

        Ok(s)
    }
}

/// Expands an async test taking `&TestHelper` arguments into one tokio test per attribute.
///
/// ```ignore
/// #[vendor_test(arg(vendor = "mysql"))]
/// #[vendor_test(arg(vendor = "sqlite"))]
/// async fn reads_tables(helper: &TestHelper) { ... }
/// ```
///
/// generates `mysql_reads_tables` and `sqlite_reads_tables`.
#[proc_macro_attribute]
pub fn vendor_test(args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let function_name = &input.sig.ident;

    let attr_args = match NestedMeta::parse_meta_list(args.into()) {
        Ok(v) => v,
        Err(e) => { return TokenStream::from(darling::Error::from(e).write_errors()); }
    };

    let args = match TestArgs::from_list(&attr_args) {
        Ok(v) => v,
        Err(e) => { return TokenStream::from(e.write_errors()); }
    };

    if input.sig.inputs.len() != args.args.len() {
        return TokenStream::from(darling::Error::custom(format!("Function is declared to have {} args, however attribute defines {} args", input.sig.inputs.len(), args.args.len())).write_errors());
    }

    let module_name = match args.get_module_name() {
        Ok(name) => syn::Ident::new(&name, Span::call_site().into()),
        Err(e) => { return TokenStream::from(e.write_errors()); }
    };

    let mut test_helpers_create = Vec::with_capacity(args.args.len());
    let mut arg_idents = Vec::with_capacity(args.args.len());

    for (arg, input) in args.args.iter().zip(input.sig.inputs.iter()) {
        let vendor = match arg.get_vendor_variant() {
            Ok(v) => v,
            Err(e) => { return TokenStream::from(e.write_errors()); }
        };

        let arg_ident = match &input {
            syn::FnArg::Typed(t) => match &*t.pat {
                syn::Pat::Ident(i) => &i.ident,
                _ => { return TokenStream::from(darling::Error::custom("Only simple identifiers are supported as function arguments").write_errors()); }
            },
            _ => { return TokenStream::from(darling::Error::custom("Only simple identifiers are supported as function arguments").write_errors()); }
        };
        arg_idents.push(arg_ident.clone());

        let arg_name = arg_ident.to_string();

        test_helpers_create.push(quote! {
            let #arg_ident = crate::test_helpers::get_test_helper(#arg_name, #vendor).await;
        });
    }

    let actual_test_function_name = quote::format_ident!("{module_name}_{function_name}");

    let invoke_actual_function = if input.sig.asyncness.is_some() {
        quote! {
            #function_name(
                #(&#arg_idents),*
            ).await;
        }
    } else {
        quote! {
            #function_name(
                #(&#arg_idents),*
            );
        }
    };

    let test_function = quote! {

            #input

            #[tokio::test]
            async fn #actual_test_function_name() {
                #(#test_helpers_create)*

                #invoke_actual_function
            }
        };

    TokenStream::from(test_function)
}
