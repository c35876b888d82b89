/// Compares a transaction's request header value to an expected value.
///
/// Example usage:
/// assert_request_header_eq!(tx, "host", "www.example.com");
#[macro_export]
macro_rules! assert_request_header_eq {
    ($tx:expr, $key:expr, $val:expr) => {{
        let header = $tx
            .request_headers
            .get_nocase_nozero($key)
            .unwrap_or_else(|| panic!("expected request header '{}' to exist", $key));
        assert!(
            header.value.eq_slice($val),
            "request header '{}' is {:?}, expected {:?}",
            $key,
            header.value,
            $val
        );
    }};
}

/// Compares a transaction's response header value to an expected value.
#[macro_export]
macro_rules! assert_response_header_eq {
    ($tx:expr, $key:expr, $val:expr) => {{
        let header = $tx
            .response_headers
            .get_nocase_nozero($key)
            .unwrap_or_else(|| panic!("expected response header '{}' to exist", $key));
        assert!(
            header.value.eq_slice($val),
            "response header '{}' is {:?}, expected {:?}",
            $key,
            header.value,
            $val
        );
    }};
}
