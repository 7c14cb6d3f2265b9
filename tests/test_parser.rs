use minihttp::http::message::Body;
use minihttp::http::parser::{ParseError, ParseLimits, Parser};

fn limits(token_max: usize, header_line_max: usize) -> ParseLimits {
    ParseLimits {
        token_max,
        header_line_max,
        bodyless_methods: vec!["GET".to_string()],
    }
}

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.method.as_deref(), Some("GET"));
    assert_eq!(parsed.target.as_deref(), Some("/hello"));
    assert_eq!(parsed.version.as_deref(), Some("HTTP/1.1"));
    assert_eq!(parsed.get("Host"), Some("x"));
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.body, Body::Empty);
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.method.as_deref(), Some("POST"));
    assert_eq!(parsed.body, Body::Owned(b"abc".to_vec()));
}

#[test]
fn test_parse_body_ignores_trailing_garbage() {
    let req = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGARBAGE";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.body_bytes(), b"abc");
}

#[test]
fn test_parse_body_without_content_length_takes_rest() {
    let req = b"PUT /items/1 HTTP/1.1\r\nHost: x\r\n\r\nwhole rest";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.body_bytes(), b"whole rest");
}

#[test]
fn test_parse_body_shorter_than_declared_is_truncated() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.body_bytes(), b"hello");
}

#[test]
fn test_parse_binary_body() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x00\x03";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.body_bytes(), &[0, 1, 0, 3]);
}

#[test]
fn test_parse_garbage_content_length_reads_as_zero() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: abc\r\n\r\nhello";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.body, Body::Owned(Vec::new()));
}

#[test]
fn test_parse_get_ignores_body_bytes() {
    let req = b"GET / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.body, Body::Empty);
}

#[test]
fn test_parse_head_still_reads_body_by_default() {
    let req = b"HEAD / HTTP/1.1\r\nHost: x\r\n\r\nleftover";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.body_bytes(), b"leftover");
}

#[test]
fn test_parse_configured_bodyless_methods() {
    let parser = Parser::new(ParseLimits {
        bodyless_methods: vec!["GET".into(), "HEAD".into(), "DELETE".into(), "OPTIONS".into()],
        ..ParseLimits::default()
    });

    for method in ["HEAD", "DELETE", "OPTIONS"] {
        let req = format!("{method} / HTTP/1.1\r\n\r\nleftover");
        let parsed = parser.parse(req.as_bytes()).unwrap();
        assert_eq!(parsed.body, Body::Empty, "{method} should have no body");
    }
}

#[test]
fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.get("Host"), Some("example.com"));
    assert_eq!(parsed.get("User-Agent"), Some("test-client"));
    assert_eq!(parsed.get("Accept"), Some("*/*"));
    assert_eq!(parsed.len(), 3);
}

#[test]
fn test_parse_duplicate_header_keeps_last() {
    let req = b"GET / HTTP/1.1\r\nX-Tag: one\r\nX-Tag: two\r\n\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed.get("X-Tag"), Some("two"));
}

#[test]
fn test_parse_value_skips_one_leading_space_only() {
    let req = b"GET / HTTP/1.1\r\nA:  two spaces\r\nB:none\r\n\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.get("A"), Some(" two spaces"));
    assert_eq!(parsed.get("B"), Some("none"));
}

#[test]
fn test_parse_value_keeps_colons() {
    let req = b"GET / HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.get("Host"), Some("localhost:8080"));
}

#[test]
fn test_parse_bare_lf_line_endings() {
    let req = b"POST /lf HTTP/1.1\nContent-Length: 2\n\nok";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.target.as_deref(), Some("/lf"));
    assert_eq!(parsed.version.as_deref(), Some("HTTP/1.1"));
    assert_eq!(parsed.get("Content-Length"), Some("2"));
    assert_eq!(parsed.body_bytes(), b"ok");
}

#[test]
fn test_parse_request_with_query_string() {
    let req = b"GET /search?q=rust HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.target.as_deref(), Some("/search?q=rust"));
}

#[test]
fn test_parse_token_truncated_at_limit() {
    let parser = Parser::new(limits(4, 64));
    let req = b"GET /abcdefgh HTTP/1.1\r\nHost: x\r\n\r\n";
    let parsed = parser.parse(req).unwrap();

    assert_eq!(parsed.method.as_deref(), Some("GET"));
    assert_eq!(parsed.target.as_deref(), Some("/abc"));
    assert_eq!(parsed.version.as_deref(), Some("HTTP"));
    assert_eq!(parsed.get("Host"), Some("x"));
}

#[test]
fn test_parse_header_truncated_at_limit() {
    let parser = Parser::new(limits(64, 3));
    let req = b"GET / HTTP/1.1\r\nUser-Agent: curl/8.0\r\nHost: x\r\n\r\n";
    let parsed = parser.parse(req).unwrap();

    assert_eq!(parsed.get("Use"), Some("cur"));
    assert_eq!(parsed.get("Hos"), Some("x"));
}

#[test]
fn test_parse_empty_request_fails() {
    let result = Parser::default().parse(b"");

    assert_eq!(result.unwrap_err(), ParseError::Empty);
}

#[test]
fn test_parse_missing_blank_line_has_no_body() {
    let req = b"POST / HTTP/1.1\r\nHost: example.com\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.get("Host"), Some("example.com"));
    assert_eq!(parsed.body, Body::Empty);
}

#[test]
fn test_parse_request_line_only() {
    let parsed = Parser::default().parse(b"GET / HTTP/1.1\r\n").unwrap();

    assert_eq!(parsed.method.as_deref(), Some("GET"));
    assert_eq!(parsed.target.as_deref(), Some("/"));
    assert_eq!(parsed.version.as_deref(), Some("HTTP/1.1"));
    assert!(parsed.is_empty());
}

#[test]
fn test_parse_truncated_request_line() {
    let parsed = Parser::default().parse(b"GET /partial").unwrap();

    assert_eq!(parsed.method.as_deref(), Some("GET"));
    assert_eq!(parsed.target, None);
    assert_eq!(parsed.version, None);
}

#[test]
fn test_parse_header_line_without_colon_ends_headers() {
    let req = b"POST / HTTP/1.1\r\nA: 1\r\nBrokenHeader\r\nB: 2\r\n\r\n";
    let parsed = Parser::default().parse(req).unwrap();

    assert_eq!(parsed.get("A"), Some("1"));
    assert_eq!(parsed.get("B"), None);
    assert_eq!(parsed.body_bytes(), b"B: 2\r\n\r\n");
}

#[test]
fn test_parse_arbitrary_bytes_terminates() {
    let noise: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let parsed = Parser::new(limits(16, 16)).parse(&noise);

    assert!(parsed.is_ok());
}

#[test]
fn test_parse_does_not_set_peer() {
    let parsed = Parser::default().parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();

    assert_eq!(parsed.peer_address(), None);
}
