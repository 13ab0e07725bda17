/// =======================================================
/// TARGET URL: where a forwarded request goes
/// =======================================================
///
/// Default behavior sends every request to the origin URL exactly as
/// configured, whatever the inbound path was. With `forward_path` the inbound
/// `path?query` is appended to the origin's base path:
///
///   origin http://app:8080/api  +  /users?id=1  ->  /api/users?id=1
///
/// - A trailing '/' on the base is dropped before joining
/// - An empty result becomes "/"
pub(crate) fn join_origin_path(base_path: &str, inbound_path_and_query: &str) -> String {
    let base = base_path.trim_end_matches('/');

    let mut tail = inbound_path_and_query.to_string();
    if !tail.starts_with('/') && !tail.starts_with('?') {
        tail.insert(0, '/');
    }

    let joined = format!("{base}{tail}");
    if joined.is_empty() || joined.starts_with('?') {
        return format!("/{joined}");
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::join_origin_path;

    #[test]
    fn joins_under_base_path() {
        assert_eq!(join_origin_path("/api", "/users?id=1"), "/api/users?id=1");
        assert_eq!(join_origin_path("/api/", "/users"), "/api/users");
    }

    #[test]
    fn root_base_keeps_inbound_target() {
        assert_eq!(join_origin_path("/", "/a?x=2&x=1"), "/a?x=2&x=1");
        assert_eq!(join_origin_path("", "/"), "/");
    }

    #[test]
    fn query_only_target_gets_a_slash() {
        assert_eq!(join_origin_path("/", "?q=1"), "/?q=1");
    }
}
