use std::net::IpAddr;

/// Endpoint tuple a higher layer can use to correlate packets of one flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub transport: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub vlan_tag: Option<u16>,
}

impl ConversationKey {
    pub fn reverse(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            transport: self.transport,
            src_port: self.dst_port,
            dst_port: self.src_port,
            vlan_tag: self.vlan_tag,
        }
    }

    /// Direction-independent form: both directions of a flow map to the
    /// same key.
    pub fn canonical(&self) -> Self {
        if (self.src, self.src_port) <= (self.dst, self.dst_port) {
            *self
        } else {
            self.reverse()
        }
    }
}
