//! Per-frame-type flag bits (spec §4.A, §6).

use bitflags::bitflags;

bitflags! {
    pub struct DataFlags: u8 {
        const FIN = 0x01;
    }
}

bitflags! {
    pub struct SynStreamFlags: u8 {
        const FIN = 0x01;
        const UNIDIRECTIONAL = 0x02;
    }
}

bitflags! {
    pub struct SynReplyFlags: u8 {
        const FIN = 0x01;
    }
}

bitflags! {
    pub struct HeadersFlags: u8 {
        const FIN = 0x01;
    }
}

bitflags! {
    pub struct SettingsFlags: u8 {
        const CLEAR_SETTINGS = 0x01;
    }
}

bitflags! {
    pub struct SettingsEntryFlags: u8 {
        const PERSIST_VALUE = 0x01;
        const PERSISTED = 0x02;
    }
}
