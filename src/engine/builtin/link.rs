use crate::engine::constants::{ethertype_name, table};
use crate::engine::context::Context;
use crate::engine::cursor::Cursor;
use crate::engine::registry::{DissectResult, HandlerResult};
use crate::engine::tree::FieldValue;
use crate::packet::{ByteView, Endianness};
use crate::state::ConversationKey;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
/// Type/length values up to this are 802.3 lengths, not ethertypes.
const MAX_8023_LENGTH: u16 = 1500;

pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(":")
}

pub(super) fn dissect_ethernet(view: &ByteView, ctx: &mut Context<'_>) -> HandlerResult {
    let mut cursor = Cursor::new(view);
    let destination = cursor.read_bytes(6)?;
    let source = cursor.read_bytes(6)?;
    let ethertype = cursor.read_u16_be()?;

    if ctx.is_building_tree() {
        ctx.add_field(view, 0, 6, "eth.dst", FieldValue::Str(format_mac(destination)));
        ctx.add_field(view, 6, 6, "eth.src", FieldValue::Str(format_mac(source)));
        ctx.add_field(view, 12, 2, "eth.type", FieldValue::UInt(ethertype.into()));
    }
    ctx.append_summary(format!(
        "Ethernet II, Src: {}, Dst: {}",
        format_mac(source),
        format_mac(destination)
    ));

    let payload = cursor.rest()?;
    let consumed = if ethertype <= MAX_8023_LENGTH {
        ctx.call_data(&payload)?
    } else {
        ctx.dispatch(table::ETHERTYPE, ethertype, &payload)?
    };

    Ok(DissectResult::Consumed(ETHERNET_HEADER_LEN + consumed))
}

pub(super) fn dissect_vlan(view: &ByteView, ctx: &mut Context<'_>) -> HandlerResult {
    let tci = view.read_u16(0, Endianness::Big)?;
    let ethertype = view.read_u16(2, Endianness::Big)?;
    let priority = tci >> 13;
    let vlan_id = tci & 0x0fff;

    if ctx.is_building_tree() {
        ctx.add_field(view, 0, 2, "vlan.priority", FieldValue::UInt(priority.into()));
        ctx.add_field(view, 0, 2, "vlan.id", FieldValue::UInt(vlan_id.into()));
        ctx.add_field(view, 2, 2, "vlan.etype", FieldValue::UInt(ethertype.into()));
    }
    ctx.append_summary(format!(
        "802.1Q Virtual LAN, PRI: {}, ID: {}, Type: {}",
        priority,
        vlan_id,
        ethertype_name(ethertype)
    ));

    let payload = view.tail(VLAN_TAG_LEN)?;
    let consumed = ctx.dispatch(table::ETHERTYPE, ethertype, &payload)?;

    // Transports fill the key in without knowing about the tag.
    if let Some(key) = ctx.conversation_key().copied()
        && key.vlan_tag.is_none()
    {
        ctx.set_conversation_key(ConversationKey {
            vlan_tag: Some(vlan_id),
            ..key
        });
    }

    Ok(DissectResult::Consumed(VLAN_TAG_LEN + consumed))
}
