use meshnet_routing::Instance;

/// Kind tag byte for each wire packet, per the §6 frame layout.
pub mod kind {
    pub const HANDSHAKE: u8 = 0x01;
    pub const UPDATE: u8 = 0x02;
    pub const DATA: u8 = 0x03;
    pub const ACK: u8 = 0x04;
    pub const INTERNET: u8 = 0x05;
    pub const INTERNET_RESPONSE: u8 = 0x06;
}

/// The six packet kinds the mesh protocol exchanges. Every variant carries
/// a `sequence`, drawn from the same per-host counter regardless of kind —
/// an `Ack`'s sequence is the sequence of the `Data` packet it acknowledges,
/// not a freshly generated one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Packet {
    Handshake { sequence: u16, originator: Instance, internet_hops: u8 },
    Update { sequence: u16, instance: Instance, hop_count: u8, reachable: bool, internet_hops: u8 },
    Data { sequence: u16, origin: Instance, destination: Instance, payload: Vec<u8> },
    Ack { sequence: u16, origin: Instance, destination: Instance },
    Internet { sequence: u16, originator: Instance, url: String, body: Vec<u8>, test_id: u32, hop_count: u8 },
    InternetResponse { sequence: u16, originator: Instance, code: u16, body: Vec<u8> },
}

impl Packet {
    pub fn sequence(&self) -> u16 {
        match self {
            Packet::Handshake { sequence, .. }
            | Packet::Update { sequence, .. }
            | Packet::Data { sequence, .. }
            | Packet::Ack { sequence, .. }
            | Packet::Internet { sequence, .. }
            | Packet::InternetResponse { sequence, .. } => *sequence,
        }
    }

    pub fn kind_tag(&self) -> u8 {
        match self {
            Packet::Handshake { .. } => kind::HANDSHAKE,
            Packet::Update { .. } => kind::UPDATE,
            Packet::Data { .. } => kind::DATA,
            Packet::Ack { .. } => kind::ACK,
            Packet::Internet { .. } => kind::INTERNET,
            Packet::InternetResponse { .. } => kind::INTERNET_RESPONSE,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Packet::Handshake { .. } => "Handshake",
            Packet::Update { .. } => "Update",
            Packet::Data { .. } => "Data",
            Packet::Ack { .. } => "Ack",
            Packet::Internet { .. } => "Internet",
            Packet::InternetResponse { .. } => "InternetResponse",
        }
    }
}
