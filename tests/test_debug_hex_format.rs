use chordring::core::{Address, Identifier, PeerRef, Responsibility};

#[test]
fn test_responsibility_debug_shows_hex_payload_not_raw_bytes() {
    let payload = vec![69, 11, 103, 102, 141, 75, 166, 128];
    let entry = Responsibility::new("weather", payload.clone(), Some(42));

    let debug_output = format!("{:?}", entry);
    let expected_hex = hex::encode(&payload);

    assert!(debug_output.contains(&expected_hex));
    assert!(debug_output.contains("450b67668d4ba680"));
    assert!(debug_output.contains("weather"));
    assert!(debug_output.contains("42"));

    // Should NOT contain raw byte array format like "[69, 11, ...]"
    assert!(!debug_output.contains("[69"));
    assert!(!debug_output.contains("69, 11"));
}

#[test]
fn test_identifier_debug_is_decimal() {
    let identifier = Identifier::new(200);
    assert_eq!(format!("{:?}", identifier), "200");
    assert_eq!(format!("{}", identifier), "200");
}

#[test]
fn test_peer_ref_debug_shows_address_and_id() {
    let address: Address = "localhost:8080".parse().unwrap();
    let peer = PeerRef::new(address, 8);

    let debug_output = format!("{:?}", peer);
    assert_eq!(debug_output, format!("localhost:8080#{}", peer.id()));
}
