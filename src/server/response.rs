use crate::dispatcher::WireResponse;
use may_minihttp::Response;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

/// Write a materialized response to the transport.
///
/// The transport computes `Content-Length` itself from the body it is
/// handed, so any length header carried on the wire response is dropped
/// here instead of being emitted twice.
pub fn write_wire_response(res: &mut Response, wire: WireResponse) {
    res.status_code(wire.status as usize, status_reason(wire.status));
    for (name, value) in &wire.headers {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        // The transport takes `&'static str` headers only, so each dynamic
        // header is a small leaked allocation, one per header per response.
        let header = format!("{name}: {value}").into_boxed_str();
        res.header(Box::leak(header));
    }
    if wire.head_only {
        res.body_vec(Vec::new());
    } else {
        res.body_vec(wire.body);
    }
}
