//! Derive macro for codedb table declarations.
//!
//! `#[derive(Table)]` turns a struct with named fields into an
//! implementation of `codedb_core::schema::DeclareTable` and
//! `codedb_core::connection::FromRow`, plus a `{Struct}Columns` struct
//! holding the bound column of every field.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, LitInt, LitStr, Meta, Type};

/// Derives `DeclareTable` for a struct.
///
/// # Attributes
///
/// - `#[table(name = "table_name")]` - Specifies the SQL table name (optional,
///   defaults to snake_case of struct name)
///
/// # Field Attributes
///
/// - `#[column(name = "column_name")]` - Logical column name (optional,
///   defaults to the field name)
/// - `#[column(primary_key)]` - Part of the primary key
/// - `#[column(serial)]` - Auto-incrementing (`i32`/`i64` only)
/// - `#[column(nullable)]` - Nullable; implied by `Option<T>`
/// - `#[column(index = N)]` - Member of index tier `N` (1 to 4)
/// - `#[column(unique = N)]` - Member of unique tier `N` (1 to 4)
/// - `#[column(gin)]` - Its index uses the `gin` method
/// - `#[column(default_now)]` - Defaults to `CURRENT_TIMESTAMP`
///
/// # Generated Items
///
/// For a struct `User`:
///
/// - `impl DeclareTable for User`, binding one member per field, named
///   after the field
/// - `impl FromRow for User`, reading field `i` from result column `i`
/// - `UserColumns`, with one `Arc<Column>` per field, a `bind`
///   constructor resolving them on a `TableDef` and a `select_list` in
///   field order
#[proc_macro_derive(Table, attributes(table, column))]
pub fn derive_table(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_table_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_table_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let table_name = get_table_name(&input.attrs, struct_name)?;

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Table derive only supports structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            input,
            "Table derive only supports structs with named fields",
        ));
    };

    let mut columns: Vec<ColumnInfo> = Vec::new();
    for field in &fields.named {
        let Some(field_name) = field.ident.clone() else {
            continue;
        };
        let attrs = parse_column_attrs(&field.attrs)?;
        columns.push(ColumnInfo {
            column_name: attrs
                .name
                .clone()
                .unwrap_or_else(|| field_name.to_string()),
            field_name,
            field_type: field.ty.clone(),
            attrs,
        });
    }

    let declarations: Vec<TokenStream2> = columns
        .iter()
        .map(|info| {
            let member = info.field_name.to_string();
            let column_name = &info.column_name;
            let field_type = &info.field_type;
            let flags = info.attrs.flags_tokens();
            quote! {
                ctx.column::<#field_type>(#member, #column_name, #flags)?;
            }
        })
        .collect();

    let columns_struct_name = format_ident!("{}Columns", struct_name);
    let field_names: Vec<&Ident> = columns.iter().map(|c| &c.field_name).collect();
    let members: Vec<String> = field_names.iter().map(ToString::to_string).collect();
    let indices: Vec<usize> = (0..columns.len()).collect();

    let expanded = quote! {
        impl ::codedb_core::schema::DeclareTable for #struct_name {
            const TABLE_NAME: &'static str = #table_name;

            fn declare(
                ctx: &mut ::codedb_core::schema::DeclareContext<'_>,
            ) -> ::codedb_core::Result<()> {
                #(#declarations)*
                Ok(())
            }
        }

        impl ::codedb_core::connection::FromRow for #struct_name {
            fn from_row(
                row: &::codedb_core::connection::Row,
            ) -> ::codedb_core::Result<Self> {
                Ok(Self {
                    #(
                        #field_names: row.try_get(#indices)?,
                    )*
                })
            }
        }

        /// Bound columns of one table instance.
        #[derive(Debug, Clone)]
        pub struct #columns_struct_name {
            #(
                #[allow(missing_docs)]
                pub #field_names: ::std::sync::Arc<::codedb_core::schema::Column>,
            )*
        }

        impl #columns_struct_name {
            /// Resolves every member on `table`.
            pub fn bind(
                table: &::codedb_core::schema::TableDef,
            ) -> ::codedb_core::Result<Self> {
                Ok(Self {
                    #(
                        #field_names: ::std::sync::Arc::clone(table.column(#members)?),
                    )*
                })
            }

            /// Every column in field order, the select list read back by
            /// `FromRow`.
            pub fn select_list(&self) -> ::std::vec::Vec<::codedb_core::expr::Expr> {
                ::std::vec![
                    #(
                        ::codedb_core::expr::col(&self.#field_names),
                    )*
                ]
            }
        }
    };

    Ok(expanded)
}

struct ColumnInfo {
    field_name: Ident,
    field_type: Type,
    column_name: String,
    attrs: ColumnAttrs,
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    primary_key: bool,
    serial: bool,
    nullable: bool,
    gin: bool,
    default_now: bool,
    index_tiers: Vec<u8>,
    unique_tiers: Vec<u8>,
}

impl ColumnAttrs {
    fn flags_tokens(&self) -> TokenStream2 {
        let mut names: Vec<Ident> = Vec::new();
        for (set, name) in [
            (self.nullable, "NULLABLE"),
            (self.primary_key, "PRIMARY_KEY"),
            (self.serial, "SERIAL"),
            (self.gin, "GIN"),
            (self.default_now, "DEFAULT_NOW"),
        ] {
            if set {
                names.push(format_ident!("{}", name));
            }
        }
        names.extend(self.index_tiers.iter().map(|t| format_ident!("INDEX_{}", t)));
        names.extend(self.unique_tiers.iter().map(|t| format_ident!("UNIQUE_{}", t)));
        quote! {
            ::codedb_core::schema::ColumnFlags::empty()
                #(| ::codedb_core::schema::ColumnFlags::#names)*
        }
    }
}

fn get_table_name(attrs: &[Attribute], struct_name: &Ident) -> syn::Result<String> {
    for attr in attrs {
        if attr.path().is_ident("table") {
            let mut table_name = None;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let value: LitStr = meta.value()?.parse()?;
                    table_name = Some(value.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported table attribute"))
                }
            })?;
            if let Some(name) = table_name {
                return Ok(name);
            }
        }
    }
    // Default to snake_case of struct name
    Ok(to_snake_case(&struct_name.to_string()))
}

fn parse_tier(lit: &LitInt) -> syn::Result<u8> {
    let tier: u8 = lit.base10_parse()?;
    if (1..=4).contains(&tier) {
        Ok(tier)
    } else {
        Err(syn::Error::new_spanned(lit, "tier must be between 1 and 4"))
    }
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<ColumnAttrs> {
    let mut result = ColumnAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        // Handle empty attribute like #[column]
        if matches!(attr.meta, Meta::Path(_)) {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
            } else if meta.path.is_ident("primary_key") {
                result.primary_key = true;
            } else if meta.path.is_ident("serial") {
                result.serial = true;
            } else if meta.path.is_ident("nullable") {
                result.nullable = true;
            } else if meta.path.is_ident("gin") {
                result.gin = true;
            } else if meta.path.is_ident("default_now") {
                result.default_now = true;
            } else if meta.path.is_ident("index") {
                let lit: LitInt = meta.value()?.parse()?;
                result.index_tiers.push(parse_tier(&lit)?);
            } else if meta.path.is_ident("unique") {
                let lit: LitInt = meta.value()?.parse()?;
                result.unique_tiers.push(parse_tier(&lit)?);
            } else {
                return Err(meta.error("unsupported column attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
