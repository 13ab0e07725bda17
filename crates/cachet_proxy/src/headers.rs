use http::{header, HeaderMap};

/// Copies inbound headers for the origin request.
///
/// Every name/value pair goes through verbatim, duplicates included. `Host`
/// is left out: the client fills it in from the origin URL.
pub(crate) fn copy_request_headers(inbound: &HeaderMap, outbound: &mut HeaderMap) {
    for (name, value) in inbound.iter() {
        if name == header::HOST {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
}
