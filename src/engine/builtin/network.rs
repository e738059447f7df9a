use std::net::{Ipv4Addr, Ipv6Addr};

use crate::engine::constants::{ip_protocol_name, table};
use crate::engine::context::Context;
use crate::engine::error::DissectError;
use crate::engine::registry::{DissectResult, HandlerResult};
use crate::engine::tree::FieldValue;
use crate::packet::{ByteView, Endianness};

const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const IPV4_MORE_FRAGMENTS: u16 = 0x2000;
const IPV4_FRAGMENT_OFFSET_MASK: u16 = 0x1fff;

pub(super) fn dissect_ipv4(view: &ByteView, ctx: &mut Context<'_>) -> HandlerResult {
    let first = view.read_u8(0)?;
    let version = first >> 4;
    if version != 4 {
        return Err(DissectError::malformed(format!(
            "Bogus IP version ({}, must be 4)",
            version
        )));
    }

    let header_len = usize::from(first & 0x0f) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(DissectError::malformed(format!(
            "Bogus IP header length ({}, must be at least {})",
            header_len, IPV4_MIN_HEADER_LEN
        )));
    }

    let total_len = usize::from(view.read_u16(2, Endianness::Big)?);
    if total_len < header_len {
        return Err(DissectError::malformed(format!(
            "Bogus IP length ({}, less than header length {})",
            total_len, header_len
        )));
    }

    let flags_fragment = view.read_u16(6, Endianness::Big)?;
    let ttl = view.read_u8(8)?;
    let protocol = view.read_u8(9)?;
    let source = Ipv4Addr::from(view.read_u32(12, Endianness::Big)?);
    let destination = Ipv4Addr::from(view.read_u32(16, Endianness::Big)?);
    view.bytes(0, header_len)?;

    if ctx.is_building_tree() {
        ctx.add_field(view, 0, 1, "ip.version", FieldValue::UInt(version.into()));
        ctx.add_field(view, 0, 1, "ip.hdr_len", FieldValue::UInt(header_len as u64));
        ctx.add_field(view, 2, 2, "ip.len", FieldValue::UInt(total_len as u64));
        ctx.add_field(view, 8, 1, "ip.ttl", FieldValue::UInt(ttl.into()));
        ctx.add_field(view, 9, 1, "ip.proto", FieldValue::UInt(protocol.into()));
        ctx.add_field(view, 12, 4, "ip.src", FieldValue::Str(source.to_string()));
        ctx.add_field(view, 16, 4, "ip.dst", FieldValue::Str(destination.to_string()));
    }
    ctx.set_addresses(source.into(), destination.into());
    ctx.append_summary(format!(
        "Internet Protocol Version 4, Src: {}, Dst: {}, Protocol: {}",
        source,
        destination,
        ip_protocol_name(protocol)
    ));

    let payload = view.slice(header_len, Some(total_len - header_len))?;
    let fragmented = flags_fragment & IPV4_MORE_FRAGMENTS != 0
        || flags_fragment & IPV4_FRAGMENT_OFFSET_MASK != 0;

    // No reassembly: fragments are handed over as opaque data.
    let consumed = if fragmented {
        ctx.call_data(&payload)?
    } else {
        ctx.dispatch(table::IP_PROTO, protocol, &payload)?
    };

    Ok(DissectResult::Consumed(header_len + consumed))
}

pub(super) fn dissect_ipv6(view: &ByteView, ctx: &mut Context<'_>) -> HandlerResult {
    let first_word = view.read_u32(0, Endianness::Big)?;
    let version = first_word >> 28;
    if version != 6 {
        return Err(DissectError::malformed(format!(
            "Bogus IPv6 version ({}, must be 6)",
            version
        )));
    }

    let payload_len = usize::from(view.read_u16(4, Endianness::Big)?);
    let next_header = view.read_u8(6)?;
    let hop_limit = view.read_u8(7)?;
    let source = read_ipv6_addr(view, 8)?;
    let destination = read_ipv6_addr(view, 24)?;

    if ctx.is_building_tree() {
        ctx.add_field(view, 4, 2, "ipv6.plen", FieldValue::UInt(payload_len as u64));
        ctx.add_field(view, 6, 1, "ipv6.nxt", FieldValue::UInt(next_header.into()));
        ctx.add_field(view, 7, 1, "ipv6.hlim", FieldValue::UInt(hop_limit.into()));
        ctx.add_field(view, 8, 16, "ipv6.src", FieldValue::Str(source.to_string()));
        ctx.add_field(view, 24, 16, "ipv6.dst", FieldValue::Str(destination.to_string()));
    }
    ctx.set_addresses(source.into(), destination.into());
    ctx.append_summary(format!(
        "Internet Protocol Version 6, Src: {}, Dst: {}",
        source, destination
    ));

    let payload = view.slice(IPV6_HEADER_LEN, Some(payload_len))?;
    let consumed = ctx.dispatch(table::IP_PROTO, next_header, &payload)?;
    Ok(DissectResult::Consumed(IPV6_HEADER_LEN + consumed))
}

fn read_ipv6_addr(view: &ByteView, offset: usize) -> Result<Ipv6Addr, DissectError> {
    let high = view.read_u64(offset, Endianness::Big)?;
    let low = view.read_u64(offset + 8, Endianness::Big)?;
    Ok(Ipv6Addr::from((u128::from(high) << 64) | u128::from(low)))
}
