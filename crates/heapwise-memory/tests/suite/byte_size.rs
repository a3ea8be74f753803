use heapwise_memory::{parse_byte_size, ByteSizeParseError, GB, KB, MB};

#[test]
fn plain_integers_are_bytes() {
    assert_eq!(parse_byte_size("0"), Ok(0));
    assert_eq!(parse_byte_size("1048576"), Ok(MB));
    assert_eq!(parse_byte_size("1_048_576"), Ok(MB));
    assert_eq!(parse_byte_size("512b"), Ok(512));
}

#[test]
fn jvm_style_suffixes() {
    assert_eq!(parse_byte_size("64k"), Ok(64 * KB));
    assert_eq!(parse_byte_size("750m"), Ok(750 * MB));
    assert_eq!(parse_byte_size("4g"), Ok(4 * GB));
    assert_eq!(parse_byte_size("16 GiB"), Ok(16 * GB));
    assert_eq!(parse_byte_size("1TB"), Ok(1024 * GB));
}

#[test]
fn rejects_malformed_sizes() {
    assert_eq!(parse_byte_size("   "), Err(ByteSizeParseError::Empty));
    assert_eq!(
        parse_byte_size("GiB"),
        Err(ByteSizeParseError::InvalidNumber("GiB".to_owned()))
    );
    assert_eq!(
        parse_byte_size("12 parsecs"),
        Err(ByteSizeParseError::UnknownSuffix("parsecs".to_owned()))
    );
    assert!(matches!(
        parse_byte_size("99999999999999999999"),
        Err(ByteSizeParseError::InvalidNumber(_))
    ));
    assert!(matches!(
        parse_byte_size("18446744073709551615T"),
        Err(ByteSizeParseError::Overflow(_))
    ));
}

#[test]
fn error_messages_name_the_input() {
    let err = parse_byte_size("3 bananas").unwrap_err();
    assert!(err.to_string().contains("bananas"), "{err}");
}
