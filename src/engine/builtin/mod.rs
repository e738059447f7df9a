//! Reference handlers for the common link, network and transport layers.
//!
//! [`BuiltinProtocols`] creates the well-known tables other modules hand off
//! into (`wtap_encap`, `ethertype`, `ip.proto`, `udp.port`, `tcp.port`) and
//! binds Ethernet, VLAN, IPv4, IPv6, UDP and TCP into them.

mod link;
mod network;
mod transport;


use crate::engine::constants::{ethertype, ip_proto, link_type, table};
use crate::engine::error::RegistrationError;
use crate::engine::registry::{Handler, ProtocolModule, RegistryBuilder};

pub use self::link::format_mac;

const PROTOCOLS: &[(&str, &str)] = &[
    ("eth", "Ethernet II"),
    ("vlan", "802.1Q Virtual LAN"),
    ("ip", "Internet Protocol Version 4"),
    ("ipv6", "Internet Protocol Version 6"),
    ("udp", "User Datagram Protocol"),
    ("tcp", "Transmission Control Protocol"),
];

const TABLES: &[(&str, &str)] = &[
    (table::WTAP_ENCAP, "Wiretap encapsulation type"),
    (table::ETHERTYPE, "Ethertype"),
    (table::IP_PROTO, "IP protocol"),
    (table::UDP_PORT, "UDP port"),
    (table::TCP_PORT, "TCP port"),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinProtocols;

impl ProtocolModule for BuiltinProtocols {
    fn register(&self, registry: &mut RegistryBuilder) -> Result<(), RegistrationError> {
        for (short_name, ui_name) in PROTOCOLS {
            registry.register_protocol(short_name, ui_name)?;
        }
        for (name, ui_name) in TABLES {
            registry.register_table(name, ui_name)?;
        }
        Ok(())
    }

    fn handoff(&self, registry: &mut RegistryBuilder) -> Result<(), RegistrationError> {
        let eth = Handler::new(registry.protocol_id("eth")?, link::dissect_ethernet);
        registry.register_handler_by_name(table::WTAP_ENCAP, link_type::ETHERNET, eth.clone())?;
        registry.register_named("eth_withoutfcs", eth)?;

        let vlan = Handler::new(registry.protocol_id("vlan")?, link::dissect_vlan);
        registry.register_handler_by_name(table::ETHERTYPE, ethertype::VLAN_8021Q, vlan.clone())?;
        registry.register_handler_by_name(table::ETHERTYPE, ethertype::QINQ_8021AD, vlan)?;

        let ip = Handler::new(registry.protocol_id("ip")?, network::dissect_ipv4);
        registry.register_handler_by_name(table::ETHERTYPE, ethertype::IPV4, ip)?;

        let ipv6 = Handler::new(registry.protocol_id("ipv6")?, network::dissect_ipv6);
        registry.register_handler_by_name(table::ETHERTYPE, ethertype::IPV6, ipv6)?;

        let udp = Handler::new(registry.protocol_id("udp")?, transport::dissect_udp);
        registry.register_handler_by_name(table::IP_PROTO, ip_proto::UDP, udp)?;

        let tcp = Handler::new(registry.protocol_id("tcp")?, transport::dissect_tcp);
        registry.register_handler_by_name(table::IP_PROTO, ip_proto::TCP, tcp)?;

        Ok(())
    }
}
