use anyhow::Context;
use reqwest::Url;

/// Background image locator for a slide: `<template>?<encoded query>`.
pub fn background_url(template: &str, query: &str) -> anyhow::Result<Url> {
    let mut url =
        Url::parse(template).with_context(|| format!("invalid background endpoint {template:?}"))?;
    url.set_query(None);
    url.query_pairs_mut().append_key_only(query.trim());
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_appended_encoded() {
        let url = background_url("https://images.test/featured/", "red panda & friends").unwrap();
        assert_eq!(
            url.as_str(),
            "https://images.test/featured/?red+panda+%26+friends"
        );
    }

    #[test]
    fn existing_query_is_replaced() {
        let url = background_url("https://images.test/featured/?old", "dog").unwrap();
        assert_eq!(url.query(), Some("dog"));
    }

    #[test]
    fn invalid_template_is_an_error() {
        assert!(background_url("not a url", "dog").is_err());
    }
}
