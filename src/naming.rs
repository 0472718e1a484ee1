//! Naming derivations for domains: path parameters and display names.
//!
//! Everything here is a pure function of the domain name. The same derivation
//! is used wherever a name is needed (path templates, parameter metadata,
//! OpenAPI tags and summaries) so the three never drift apart.

/// Derive the path-parameter name for a domain.
///
/// The domain is singularized by convention and suffixed with `Id`:
/// `stores` -> `storeId`, `categories` -> `categoryId`, an already-singular
/// `product` -> `productId`.
pub fn domain_to_param(domain: &str) -> String {
    let singular = if domain.ends_with("ies") && domain.len() > 3 {
        format!("{}y", &domain[..domain.len() - 3])
    } else if domain.ends_with('s') && domain.len() > 1 {
        domain[..domain.len() - 1].to_string()
    } else {
        domain.to_string()
    };
    format!("{singular}Id")
}

/// Documentation display name: the domain with its first character upper-cased.
pub fn display_name(domain: &str) -> String {
    let mut chars = domain.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Singular form used in operation summaries ("Create a new store").
///
/// Lower-cased display name with a trailing `s` stripped. Intentionally a
/// simpler rule than [`domain_to_param`]: summaries only read naturally for
/// plural-by-convention nouns, while parameter names need the `ies`/`y` case.
pub fn singular_display_name(domain: &str) -> String {
    let lower = display_name(domain).to_lowercase();
    if lower.ends_with('s') && lower.len() > 1 {
        lower[..lower.len() - 1].to_string()
    } else {
        lower
    }
}

/// Capitalized singular name, used as the OpenAPI component key for a
/// resource's response schema ("stores" -> "Store").
pub fn component_name(domain: &str) -> String {
    display_name(&singular_display_name(domain))
}
