#![no_main]

use std::net::Ipv4Addr;

use libfuzzer_sys::fuzz_target;

use domain::common::entity::Protocol;
use domain::portmap::allocation::PortAllocationTable;
use domain::portmap::entity::{PortMapping, PortRange};
use domain::portmap::rules::generate_rule_args;

// Fuzz mapping parsing, rule generation and the allocation table.
//
// Layout:
//   [0]     = protocol selector (even=tcp, odd=udp)
//   [1..5]  = container IPv4 address
//   [5..13] = from.begin, from.end, to.begin, to.end (u16 LE)
//   rest    = UTF-8 text fed to the `FROM:TO[/PROTO]` parser
fuzz_target!(|data: &[u8]| {
    if data.len() < 13 {
        return;
    }

    let protocol = if data[0] % 2 == 0 {
        Protocol::Tcp
    } else {
        Protocol::Udp
    };
    let ip = Ipv4Addr::new(data[1], data[2], data[3], data[4]);
    let word = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
    let mapping = PortMapping::new(
        protocol,
        PortRange::new(word(5), word(7)),
        PortRange::new(word(9), word(11)),
    );
    check_mapping(ip, &mapping);

    if let Ok(text) = std::str::from_utf8(&data[13..])
        && let Ok(parsed) = text.parse::<PortMapping>()
    {
        check_mapping(ip, &parsed);
    }
});

fn check_mapping(ip: Ipv4Addr, mapping: &PortMapping) {
    let Ok(args) = generate_rule_args(ip, mapping) else {
        return;
    };

    let hosts = args.host_ports;
    let containers = args.container_ports;
    assert!(hosts.begin != 0 && hosts.begin <= hosts.end);
    assert!(containers.begin != 0 && containers.begin <= containers.end);
    assert!(hosts.span() == 0 || hosts.span() == containers.span());
    assert_eq!(args.redirect.len(), 10);
    assert_eq!(args.forward.len(), 10);
    assert_eq!(generate_rule_args(ip, mapping).ok(), Some(args.clone()));

    let expected = usize::from(hosts.span()) + 1;
    let mut table = PortAllocationTable::new();
    for (host, container) in args.port_pairs() {
        assert!(hosts.contains(host));
        assert!(containers.contains(container));
        table
            .allocate(mapping.protocol, host, ip, container)
            .expect("pairs never repeat a host port");
    }
    assert_eq!(table.len(), expected);

    for host in hosts.ports() {
        assert!(table.release(mapping.protocol, host).is_ok());
    }
    assert!(table.is_empty());
}
