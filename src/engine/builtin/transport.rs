use crate::engine::constants::{heuristic, ip_proto, table};
use crate::engine::context::Context;
use crate::engine::cursor::Cursor;
use crate::engine::error::DissectError;
use crate::engine::registry::{DissectResult, HandlerResult};
use crate::engine::tree::FieldValue;
use crate::packet::{ByteView, Endianness};
use crate::state::ConversationKey;

const UDP_HEADER_LEN: usize = 8;
const TCP_MIN_HEADER_LEN: usize = 20;

pub(super) fn dissect_udp(view: &ByteView, ctx: &mut Context<'_>) -> HandlerResult {
    let mut cursor = Cursor::new(view);
    let src_port = cursor.read_u16_be()?;
    let dst_port = cursor.read_u16_be()?;
    let length = usize::from(cursor.read_u16_be()?);
    let checksum = cursor.read_u16_be()?;

    if length < UDP_HEADER_LEN {
        return Err(DissectError::malformed(format!(
            "Bad length value {} < {}",
            length, UDP_HEADER_LEN
        )));
    }

    if ctx.is_building_tree() {
        ctx.add_field(view, 0, 2, "udp.srcport", FieldValue::UInt(src_port.into()));
        ctx.add_field(view, 2, 2, "udp.dstport", FieldValue::UInt(dst_port.into()));
        ctx.add_field(view, 4, 2, "udp.length", FieldValue::UInt(length as u64));
        ctx.add_field(view, 6, 2, "udp.checksum", FieldValue::UInt(checksum.into()));
    }
    note_conversation(ctx, ip_proto::UDP, src_port, dst_port);
    ctx.append_summary(format!(
        "User Datagram Protocol, Src Port: {}, Dst Port: {}",
        src_port, dst_port
    ));

    let payload = view.slice(UDP_HEADER_LEN, Some(length - UDP_HEADER_LEN))?;
    let consumed = dissect_ports(ctx, table::UDP_PORT, heuristic::UDP, src_port, dst_port, &payload)?;
    Ok(DissectResult::Consumed(UDP_HEADER_LEN + consumed))
}

pub(super) fn dissect_tcp(view: &ByteView, ctx: &mut Context<'_>) -> HandlerResult {
    let mut cursor = Cursor::new(view);
    let src_port = cursor.read_u16_be()?;
    let dst_port = cursor.read_u16_be()?;
    let seq = cursor.read_u32(Endianness::Big)?;
    let ack = cursor.read_u32(Endianness::Big)?;
    let offset_flags = cursor.read_u16_be()?;
    let window = cursor.read_u16_be()?;

    let header_len = usize::from(offset_flags >> 12) * 4;
    if header_len < TCP_MIN_HEADER_LEN {
        return Err(DissectError::malformed(format!(
            "Bogus TCP header length ({}, must be at least {})",
            header_len, TCP_MIN_HEADER_LEN
        )));
    }
    view.bytes(0, header_len)?;
    let flags = offset_flags & 0x01ff;

    if ctx.is_building_tree() {
        ctx.add_field(view, 0, 2, "tcp.srcport", FieldValue::UInt(src_port.into()));
        ctx.add_field(view, 2, 2, "tcp.dstport", FieldValue::UInt(dst_port.into()));
        ctx.add_field(view, 4, 4, "tcp.seq", FieldValue::UInt(seq.into()));
        ctx.add_field(view, 8, 4, "tcp.ack", FieldValue::UInt(ack.into()));
        ctx.add_field(view, 12, 1, "tcp.hdr_len", FieldValue::UInt(header_len as u64));
        ctx.add_field(view, 12, 2, "tcp.flags", FieldValue::UInt(flags.into()));
        ctx.add_field(view, 14, 2, "tcp.window_size", FieldValue::UInt(window.into()));
    }
    note_conversation(ctx, ip_proto::TCP, src_port, dst_port);

    let payload = view.tail(header_len)?;
    ctx.append_summary(format!(
        "Transmission Control Protocol, Src Port: {}, Dst Port: {}, Seq: {}, Len: {}",
        src_port,
        dst_port,
        seq,
        payload.reported_len()
    ));

    let consumed = dissect_ports(ctx, table::TCP_PORT, heuristic::TCP, src_port, dst_port, &payload)?;
    Ok(DissectResult::Consumed(header_len + consumed))
}

fn note_conversation(ctx: &mut Context<'_>, transport: u8, src_port: u16, dst_port: u16) {
    if let Some((src, dst)) = ctx.addresses() {
        ctx.set_conversation_key(ConversationKey {
            src,
            dst,
            transport,
            src_port,
            dst_port,
            vlan_tag: None,
        });
    }
}

/// Lower port first, then the higher one, then the heuristics, then data.
fn dissect_ports(
    ctx: &mut Context<'_>,
    port_table: &str,
    anchor: &str,
    src_port: u16,
    dst_port: u16,
    payload: &ByteView,
) -> Result<usize, DissectError> {
    if payload.is_empty() {
        return Ok(0);
    }

    let (low, high) = if src_port <= dst_port {
        (src_port, dst_port)
    } else {
        (dst_port, src_port)
    };

    if let Some(consumed) = ctx.try_table(port_table, low, payload)? {
        return Ok(consumed);
    }
    if high != low
        && let Some(consumed) = ctx.try_table(port_table, high, payload)?
    {
        return Ok(consumed);
    }
    if let Some(consumed) = ctx.try_heuristic(anchor, payload)? {
        return Ok(consumed);
    }
    ctx.call_data(payload)
}
