//! Update request URL construction.

use crate::config::{is_false, Config, InclusionRule, REQUEST_FIELDS};

/// Whether a value is sent under the given rule.
pub fn should_include(rule: InclusionRule, value: &str) -> bool {
    match rule {
        InclusionRule::Never => false,
        InclusionRule::Always => true,
        InclusionRule::NotEmpty => !value.is_empty(),
        InclusionRule::NotFalse => !is_false(value),
    }
}

/// Build the update URL with credentials embedded.
///
/// Query parameters follow registry order and each one is terminated by `&`,
/// so the URL always ends with a separator. Values are sent as configured.
pub fn build_url(config: &Config) -> String {
    url_with_token(config, &config.token)
}

/// Same as [`build_url`] with the token masked, for logs.
pub fn redacted_url(config: &Config) -> String {
    url_with_token(config, "****")
}

fn url_with_token(config: &Config, token: &str) -> String {
    let mut url = format!(
        "{}://{}:{}@{}?",
        config.proto, config.username, token, config.url
    );

    for field in REQUEST_FIELDS {
        let value = config.value(field.key);
        if should_include(field.inclusion, &value) {
            url.push_str(field.name);
            url.push('=');
            url.push_str(&value);
            url.push('&');
        }
    }
    url
}
