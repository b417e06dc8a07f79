use pmctx_types::*;

#[test]
fn test_plain_host() {
    let (hosts, attrs) = parse_host_target("localhost").unwrap();
    assert_eq!(hosts, vec![HostSpec::new("localhost")]);
    assert_eq!(attrs, HostAttributes::default());
}

#[test]
fn test_ports_and_proxy() {
    let (hosts, _) = parse_host_target("db1:44321,44322@gateway:44322").unwrap();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts[0].name, "db1");
    assert_eq!(hosts[0].ports, vec![44321, 44322]);
    assert_eq!(hosts[1].name, "gateway");
    assert_eq!(hosts[1].ports, vec![44322]);
}

#[test]
fn test_ipv6_brackets() {
    let (hosts, _) = parse_host_target("[::1]:4000").unwrap();
    assert_eq!(hosts[0].name, "::1");
    assert_eq!(hosts[0].ports, vec![4000]);
    assert_eq!(HostSpec::unparse_list(&hosts), "[::1]:4000");
}

#[test]
fn test_attributes_map_onto_flags() {
    let (_, attrs) =
        parse_host_target("pcp://web?secure&compress&container=db&user=alice").unwrap();
    assert!(attrs.flags.contains(ContextFlags::SECURE));
    assert!(attrs.flags.contains(ContextFlags::COMPRESS));
    assert!(attrs.flags.contains(ContextFlags::CONTAINER));
    assert_eq!(attrs.container.as_deref(), Some("db"));
    assert_eq!(attrs.get("user"), Some("alice"));
}

#[test]
fn test_secure_scheme() {
    let (hosts, attrs) = parse_host_target("pcps://web").unwrap();
    assert_eq!(hosts[0].name, "web");
    assert!(attrs.flags.contains(ContextFlags::SECURE));
}

#[test]
fn test_unparse_roundtrips_through_parse() {
    let target = "db1:44321,44322@gateway";
    let (hosts, _) = parse_host_target(target).unwrap();
    let text = HostSpec::unparse_list(&hosts);
    assert_eq!(text, target);
    let (again, _) = parse_host_target(&text).unwrap();
    assert_eq!(again, hosts);
}

#[test]
fn test_malformed_targets() {
    for bad in ["", ":44321", "host:0", "host:abc", "a@@b", "[::1", "web?=x", "web?container"] {
        let err = parse_host_target(bad).unwrap_err();
        assert!(
            matches!(err, Error::BadSpecification(_)),
            "expected BadSpecification for {:?}",
            bad
        );
    }
}
