#![allow(dead_code)]

use bytes::Bytes;

pub use powerpi_bridge::magnum::device::Registry;
pub use powerpi_bridge::magnum::packet::{self, DecoderContext, Message, PacketType, RemoteTag};
pub use powerpi_bridge::prelude::*;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Canned wire captures. Values are chosen so every scaled field comes out
/// to something easy to assert on.
pub struct Factory();
impl Factory {
    /// 21-byte inverter status: INVERT mode, 12.5V on a 24V-class model
    /// (107, MS4024PAE), 60.0Hz.
    pub fn inverter() -> Bytes {
        Bytes::from_static(&[
            0x40, // mode: INVERT
            0x00, // fault: none
            0x00, 0x7D, // vdc: 125 -> 12.5
            0x00, 0x0A, // adc: 10
            120,  // VACout
            0,    // VACin
            1,    // invled
            0,    // chgled
            30,   // revision -> "3.0"
            25,   // bat temp
            35,   // tfmr temp
            30,   // fet temp
            107,  // model: MS4024PAE
            0x00, // stackmode: stand alone
            0,    // AACin
            5,    // AACout
            0x02, 0x58, // Hz: 600 -> 60.0
            0x00,
        ])
    }

    /// Same shape as `inverter` but a different revision/model pair, so a
    /// latched classifier resolves it to a remote packet.
    pub fn inverter_imposter() -> Bytes {
        let mut bytes = Self::inverter().to_vec();
        bytes[10] = 99;
        bytes[14] = 45;
        Bytes::from(bytes)
    }

    /// Undocumented remote announcement: leading zero and seven zero tail
    /// bytes.
    pub fn remote_announcement() -> Bytes {
        let mut bytes = vec![0u8; 21];
        bytes[1] = 5; // searchwatts
        bytes[13] = 25; // absorbtime
        Bytes::from(bytes)
    }

    fn remote_with_tail(tail: [u8; 7]) -> Bytes {
        let mut bytes = vec![
            0,    // action
            5,    // searchwatts
            10,   // batterysize -> 220
            2,    // battype
            80,   // chargeramps
            30,   // ainput
            51,   // revision -> 5.1
            0x21, // parallel 10, force_charge 2
            1,    // genstart
            100,  // lbco -> 10.0
            80,   // vaccutout
            134,  // vsfloat
            0,    // vEQ offset
            25,   // absorbtime -> 2.5
        ];
        bytes.extend_from_slice(&tail);
        Bytes::from(bytes)
    }

    /// Remote with the AGS SOC settings block; start delay uses the
    /// minutes-in-the-low-nibble encoding.
    pub fn remote_ags_soc() -> Bytes {
        Self::remote_with_tail([70, 90, 50, 0x84, 30, 30, 0xA2])
    }

    /// Remote with the PT-100 setpoints block.
    pub fn remote_pt_setpoints() -> Bytes {
        Self::remote_with_tail([141, 135, 145, 25, 0, 125, 0xC3])
    }

    /// 6-byte AGS status: Ready, 25.0C, 2.5h runtime, 12.5V raw.
    pub fn ags_status() -> Bytes {
        Bytes::from_static(&[0xA1, 2, 34, 77, 25, 125])
    }

    pub fn ags_counters() -> Bytes {
        Bytes::from_static(&[0xA2, 10, 80, 0x00, 0x64, 5])
    }

    /// 18-byte battery monitor status.
    pub fn bmk_status() -> Bytes {
        Bytes::from_static(&[
            0x81, // header
            75,   // soc
            0x09, 0xF6, // vdc: 2550 -> 25.5
            0xFF, 0xF1, // adc: -15 -> -1.5
            0x08, 0xFC, // vmin: 2300 -> 23.0
            0x0B, 0x54, // vmax: 2900 -> 29.0
            0xFF, 0xF6, // amph: -10
            0x01, 0xF4, // amphtrip: 500 -> 50.0
            0x00, 0x02, // amphout: 2 -> 200
            10,   // revision -> "1.0"
            1,    // fault: normal
        ])
    }

    pub fn rtr() -> Bytes {
        Bytes::from_static(&[0x91, 31])
    }

    /// 16-byte PT-100 status: address 1, on, absorb-equivalent mode bits.
    pub fn pt_status() -> Bytes {
        Bytes::from_static(&[
            0xC1, // header
            0x20, // address 1
            0xB4, // on, mode 3 (Float), regulation 4 (Hardware)
            0x00, // no fault
            0x01, 0x00, // battery: 256 -> 25.6
            0x00, 0x64, // battery_amps: 100 -> 10.0
            0x03, 0x25, // pv_voltage: 805 -> 80.5
            25,   // charge_time -> 2.5
            28,   // target battery voltage -> 2.8 * multiplier
            0x80, // relay on, no alarm
            25,   // battery temperature -> 2.5
            35,   // inductor temperature
            40,   // fet temperature
        ])
    }

    /// 13-byte PT-100 ratings.
    pub fn pt_ratings() -> Bytes {
        Bytes::from_static(&[
            0xC2, // header
            0x20, // address 1
            0x04, 0xD2, // lifetime: 1234 -> 12340
            0x01, 0xF4, // resettable: 500 -> 50.0
            0,    // ground fault current
            0x61, // nominal 24V, stacker 1
            25,   // revision -> "2.5"
            2,    // model
            85,   // output current rating
            240,  // input voltage rating
            0,    // reserved
        ])
    }

    /// 14-byte PT-100 daily statistics.
    pub fn pt_daily() -> Bytes {
        Bytes::from_static(&[
            0xC3, // header
            0x20, 0x05, // address 1, record 5
            48,  // daily kwh -> 4.8
            80,  // max pv volts
            120, // max pv volts time -> 12.0
            29,  // max battery volts
            60,  // max battery volts time -> 6.0
            24,  // min battery volts
            30,  // min battery volts time -> 3.0
            0, 100, // daily amp hours
            150, // peak power
            90,  // peak power time -> 9.0
        ])
    }

    /// 8-byte PT-100 fault record.
    pub fn pt_faults() -> Bytes {
        Bytes::from_static(&[0xC4, 0x22, 30, 100, 45, 70, 65, 0])
    }
}
