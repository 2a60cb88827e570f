mod helpers;

use std::net::TcpListener;

use helpers::{http_response, run_session, spawn_server};

#[test]
fn relays_get_using_the_domain_default() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "hello"));
    let out = run_session(format!("DOMAIN 127.0.0.1:{port}\r\nGET /\r\n\r\n"));

    let request = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(request.starts_with("GET / HTTP/1.1\r\n"));
    assert!(request.contains(&format!("host: 127.0.0.1:{port}\r\n")));

    let expected = "SLAPI/1.0 READY\r\nOK\r\n\
         HTTP/1.1 200 OK\r\n\
         \x01Content-Length: 5\r\nContent-Type: text/plain\r\n\
         \x02hello\r\n\r\n\x04";
    assert_eq!(String::from_utf8(out).unwrap(), expected);
}

#[test]
fn scheme_prefix_and_trailing_slash_are_stripped() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "ok"));
    let out = run_session(format!(
        "DOMAIN http://127.0.0.1:{port}/\r\nGET /index\r\n\r\n"
    ));

    let request = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(request.starts_with("GET /index HTTP/1.1\r\n"));
    assert!(request.contains(&format!("host: 127.0.0.1:{port}\r\n")));
    assert!(String::from_utf8(out).unwrap().contains("HTTP/1.1 200 OK\r\n"));
}

#[test]
fn host_header_beats_the_domain_default() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "ok"));
    let out = run_session(format!(
        "DOMAIN unreachable.invalid\r\nGET /\r\nHost: 127.0.0.1:{port}\r\n\r\n"
    ));

    let request = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(request.starts_with("GET / HTTP/1.1\r\n"));
    assert!(String::from_utf8(out).unwrap().ends_with("\x02ok\r\n\r\n\x04"));
}

#[test]
fn headers_can_be_suppressed() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "quiet"));
    let out = run_session(format!(
        "RESPONSE HDRS_OFF\r\nDOMAIN 127.0.0.1:{port}\r\nGET /\r\n\r\n"
    ));
    server.join().unwrap();

    let expected = "SLAPI/1.0 READY\r\nOK\r\nOK\r\n\
         HTTP/1.1 200 OK\r\n\
         \x02quiet\r\n\r\n\x04";
    assert_eq!(String::from_utf8(out).unwrap(), expected);
}

#[test]
fn request_headers_override_defaults_case_insensitively() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "ok"));
    run_session(format!(
        "HEADERS X-Token default\r\nDOMAIN 127.0.0.1:{port}\r\nGET /\r\nX-TOKEN: override\r\n\r\n"
    ));

    let request = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(request.contains("x-token: override\r\n"));
    assert!(!request.contains("default"));
}

#[test]
fn post_body_is_joined_and_terminated() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "ok"));
    run_session(format!(
        "POST /submit\r\nHost: 127.0.0.1:{port}\r\n\r\nline one\r\nline two\r\n\r\n"
    ));

    let request = String::from_utf8(server.join().unwrap()).unwrap();
    assert!(request.starts_with("POST /submit HTTP/1.1\r\n"));
    assert!(request.contains("content-length: 22\r\n"));
    assert!(request.ends_with("\r\n\r\nline one\r\nline two\r\n\r\n"));
}

#[test]
fn json_responses_are_filtered() {
    let body = r#"{"a":[{"b":1},{"b":2}]}"#;
    let (port, server) = spawn_server(http_response("200 OK", "application/json", body));
    let out = run_session(format!(
        "RESPONSE JSONPATH $.a[*].b\r\nDOMAIN 127.0.0.1:{port}\r\nGET /\r\n\r\n"
    ));
    server.join().unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("\x02[1, 2]\r\n\r\n\x04"));
}

#[test]
fn unparseable_json_yields_an_empty_body() {
    let (port, server) = spawn_server(http_response("200 OK", "application/json", "not json"));
    let out = run_session(format!(
        "RESPONSE JSONPATH $.a\r\nDOMAIN 127.0.0.1:{port}\r\nGET /\r\n\r\n"
    ));
    server.join().unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("\x02\r\n\r\n\x04"));
}

#[test]
fn jsonpath_is_skipped_for_non_json_content() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "plain"));
    let out = run_session(format!(
        "RESPONSE JSONPATH $.a\r\nDOMAIN 127.0.0.1:{port}\r\nGET /\r\n\r\n"
    ));
    server.join().unwrap();

    assert!(String::from_utf8(out).unwrap().ends_with("\x02plain\r\n\r\n\x04"));
}

#[test]
fn post_redirected_with_303_becomes_get() {
    let (second_port, second) = spawn_server(http_response("200 OK", "text/plain", "done"));
    let redirect = format!(
        "HTTP/1.1 303 See Other\r\nLocation: http://127.0.0.1:{second_port}/\r\nContent-Length: 0\r\n\r\n"
    );
    let (first_port, first) = spawn_server(redirect.into_bytes());

    let out = run_session(format!(
        "POST /\r\nHost: 127.0.0.1:{first_port}\r\n\r\npayload\r\n\r\n"
    ));

    let first_request = String::from_utf8(first.join().unwrap()).unwrap();
    assert!(first_request.starts_with("POST / HTTP/1.1\r\n"));
    assert!(first_request.ends_with("payload\r\n\r\n"));

    let second_request = String::from_utf8(second.join().unwrap()).unwrap();
    assert!(second_request.starts_with("GET / HTTP/1.1\r\n"));
    // The body was dropped, so its length must not be advertised.
    assert!(!second_request.contains("content-length"));

    // Both status lines reach the host, then the final response is framed.
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("HTTP/1.1 303 See Other\r\nHTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("\x02done\r\n\r\n\x04"));
}

#[test]
fn connect_failure_reports_a_500() {
    // Bind then drop to find a port nobody is listening on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let out = run_session(format!("GET /\r\nHost: 127.0.0.1:{port}\r\n\r\n"));
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains(&format!("SLAPI/1.0 500 Connection failed to 127.0.0.1:{port}")));
}

#[test]
fn session_continues_after_a_failed_request() {
    let (port, server) = spawn_server(http_response("200 OK", "text/plain", "alive"));

    let dead_port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let out = run_session(format!(
        "GET /\r\nHost: 127.0.0.1:{dead_port}\r\n\r\nGET /\r\nHost: 127.0.0.1:{port}\r\n\r\n"
    ));
    server.join().unwrap();

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("SLAPI/1.0 500"));
    assert!(text.ends_with("\x02alive\r\n\r\n\x04"));
}
