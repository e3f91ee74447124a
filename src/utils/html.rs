use ammonia;

/// Strip markup from free-text fields before storing them.
///
/// Display names arrive from the external identity provider and from
/// profile forms; neither source is trusted. Whitelist-based
/// sanitization keeps harmless formatting while dropping script tags
/// and event-handler attributes, guarding against stored XSS in the
/// admin account list and anywhere else names are rendered.
pub fn clean_text(input: &str) -> String {
    ammonia::clean(input)
}
