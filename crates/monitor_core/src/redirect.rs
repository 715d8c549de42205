use url::form_urlencoded;

/// Path of the login page inside the dashboard.
pub const LOGIN_PAGE: &str = "/login";

/// Endpoints that may be called without a bearer token.
const AUTH_PATHS: &[&str] = &["/auth/login"];

/// Whether an API path belongs to the unauthenticated login endpoints.
pub fn is_auth_path(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let path = path.trim_end_matches('/');
    AUTH_PATHS.iter().any(|auth| path == *auth)
}

/// Whether a location (path plus optional query) already points at the login page.
pub fn is_login_location(location: &str) -> bool {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    path == LOGIN_PAGE || path.starts_with("/login/")
}

/// Percent-encode `value` the way a browser's `encodeURIComponent` does.
///
/// Spaces become `%20`, and `!'()*~` stay literal.
pub fn encode_uri_component(value: &str) -> String {
    let serialized: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
    // A literal `+` was already escaped to `%2B`, so every `+` left here is a space.
    serialized
        .replace('+', "%20")
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%7E", "~")
}

/// Build `/login?redirect=<location>` with the location percent-encoded.
pub fn login_redirect_url(location: &str) -> String {
    format!("{LOGIN_PAGE}?redirect={}", encode_uri_component(location))
}

/// Where to send the user after a successful login from `location`.
///
/// Reads the `redirect` query parameter of a login location. Only local absolute
/// paths are honoured; anything else falls back to `/`.
pub fn return_path_after_login(location: &str) -> String {
    let query = match location.split_once('?') {
        Some((_, query)) => query.split('#').next().unwrap_or(query),
        None => return "/".to_string(),
    };

    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "redirect")
        .map(|(_, value)| value.into_owned())
        .filter(|target| is_local_path(target))
        .unwrap_or_else(|| "/".to_string())
}

fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !is_login_location(target)
}
