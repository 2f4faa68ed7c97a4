use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::prelude::*;
use crate::utils::{float_str, round};

use super::packet::{DecoderContext, Message, PacketType, RemoteTag};

pub const INVERTER: &str = "INVERTER";
pub const REMOTE: &str = "REMOTE";
pub const BMK: &str = "BMK";
pub const AGS: &str = "AGS";
pub const RTR: &str = "RTR";
pub const PT100: &str = "PT100";

// The AGS raw temperature is a sensor code above this threshold and a
// Fahrenheit reading below it; only readings get converted to Celsius.
const AGS_TEMP_SENSOR_CODE: f64 = 105.0;

fn fahrenheit_to_celsius(f: f64) -> f64 {
    round((f - 32.0) * 5.0 / 9.0, 1)
}

// Packed quarter-hour-of-day byte to an HHMM integer.
fn quarter_hours_to_hhmm(raw: i32) -> i32 {
    let minutes = raw * 15;
    (minutes / 60) * 100 + (minutes % 60)
}

// Delay bytes above 127 carry minutes in the low nibble instead of
// seconds; reinterpret them as seconds.
fn nibble_delay(raw: i32) -> i32 {
    if raw > 127 {
        (raw & 0x0F) * 60
    } else {
        raw
    }
}

// Negative relay/alarm delay bytes encode minutes.
fn signed_delay(raw: i32) -> i32 {
    if raw < 0 {
        60 * -raw
    } else {
        raw
    }
}

// AGSDevice {{{
#[derive(Clone, Debug, Serialize)]
pub struct AgsData {
    pub revision: String,
    pub status: i32,
    pub status_text: String,
    pub running: bool,
    pub temp: f64,
    pub runtime: f64,
    pub gen_last_run: i32,
    pub last_full_soc: i32,
    pub gen_total_run: i32,
    pub vdc: f64,
    #[serde(flatten)]
    trace: BTreeMap<String, String>,
    #[serde(skip)]
    trace_enabled: bool,
}

impl AgsData {
    pub fn new(trace: bool) -> Self {
        Self {
            revision: "0.0".to_string(),
            status: 0,
            status_text: String::new(),
            running: false,
            temp: 0.0,
            runtime: 0.0,
            gen_last_run: 0,
            last_full_soc: 0,
            gen_total_run: 0,
            vdc: 0.0,
            trace: BTreeMap::new(),
            trace_enabled: trace,
        }
    }

    pub fn decode(&mut self, message: &Message, ctx: &DecoderContext) {
        if self.trace_enabled {
            self.trace.insert(
                message.packet_type.to_string(),
                hex::encode_upper(&message.bytes),
            );
        }
        let f = &message.fields;
        match message.packet_type {
            PacketType::AgsStatus => {
                self.status = f[1];
                self.revision = float_str(f64::from(f[2]) / 10.0);
                self.temp = f64::from(f[3]);
                if self.temp < AGS_TEMP_SENSOR_CODE {
                    self.temp = fahrenheit_to_celsius(self.temp);
                }
                self.runtime = round(f64::from(f[4]) / 10.0, 2);
                self.status_text = ags_status_text(self.status).to_string();
                self.vdc = round(f64::from(f[5]) / 10.0 * ctx.multiplier(), 2);
                self.running = matches!(self.status, 2 | 3 | 6 | 7 | 8 | 12 | 13 | 14 | 18 | 19 | 26);
            }
            PacketType::AgsCounters => {
                self.gen_last_run = f[1];
                self.last_full_soc = f[2];
                self.gen_total_run = f[3];
            }
            _ => {}
        }
    }
}

fn ags_status_text(status: i32) -> &'static str {
    match status {
        0 => "Not Connected",
        1 => "Off",
        2 => "Ready",
        3 => "Manual Run",
        4 => "AC In",
        5 => "In quiet time",
        6 => "Start in test mode",
        7 => "Start on temperature",
        8 => "Start on voltage",
        9 => "Fault start on test",
        10 => "Fault start on temp",
        11 => "Fault start on voltage",
        12 => "Start TOD",
        13 => "Start SOC",
        14 => "Start Exercise",
        15 => "Fault start TOD",
        16 => "Fault start SOC",
        17 => "Fault start Exercise",
        18 => "Start on Amp",
        19 => "Start on Topoff",
        20 => "Not used",
        21 => "Fault start on Amp",
        22 => "Fault on Topoff",
        23 => "Not used",
        24 => "Fault max run",
        25 => "Gen Run Fault",
        26 => "Gen in Warm up",
        27 => "Gen in Cool down",
        _ => "",
    }
} // }}}

// BMKDevice {{{
#[derive(Clone, Debug, Serialize)]
pub struct BmkData {
    pub revision: String,
    pub soc: i32,
    pub vdc: f64,
    pub adc: f64,
    pub vmin: f64,
    pub vmax: f64,
    pub amph: i32,
    pub amphtrip: f64,
    pub amphout: f64,
    #[serde(rename = "Fault")]
    pub fault: i32,
    #[serde(rename = "Fault_Text")]
    pub fault_text: String,
    #[serde(flatten)]
    trace: BTreeMap<String, String>,
    #[serde(skip)]
    trace_enabled: bool,
}

impl BmkData {
    pub fn new(trace: bool) -> Self {
        Self {
            revision: String::new(),
            soc: 0,
            vdc: 0.0,
            adc: 0.0,
            vmin: 0.0,
            vmax: 0.0,
            amph: 0,
            amphtrip: 0.0,
            amphout: 0.0,
            fault: 0,
            fault_text: String::new(),
            trace: BTreeMap::new(),
            trace_enabled: trace,
        }
    }

    pub fn decode(&mut self, message: &Message) {
        if self.trace_enabled {
            self.trace.insert(
                message.packet_type.to_string(),
                hex::encode_upper(&message.bytes),
            );
        }
        if message.packet_type != PacketType::BmkStatus {
            return;
        }
        let f = &message.fields;
        self.soc = f[1];
        self.vdc = round(f64::from(f[2]) / 100.0, 2);
        self.adc = round(f64::from(f[3]) / 10.0, 2);
        self.vmin = round(f64::from(f[4]) / 100.0, 2);
        self.vmax = round(f64::from(f[5]) / 100.0, 2);
        self.amph = f[6];
        self.amphtrip = round(f64::from(f[7]) / 10.0, 2);
        self.amphout = round(f64::from(f[8]) * 100.0, 2);
        self.revision = float_str(round(f64::from(f[9]) / 10.0, 2));
        self.fault = f[10];
        match self.fault {
            0 => self.fault_text = "Reserved".to_string(),
            1 => self.fault_text = "Normal".to_string(),
            2 => self.fault_text = "Fault Start".to_string(),
            _ => {}
        }
    }
} // }}}

// InverterDevice {{{
#[derive(Clone, Debug, Serialize)]
pub struct InverterData {
    pub revision: String,
    pub mode: i32,
    pub mode_text: String,
    pub fault: i32,
    pub fault_text: String,
    pub vdc: f64,
    pub adc: i32,
    #[serde(rename = "VACout")]
    pub vac_out: i32,
    #[serde(rename = "VACin")]
    pub vac_in: i32,
    pub invled: i32,
    pub invled_text: String,
    pub chgled: i32,
    pub chgled_text: String,
    pub bat: i32,
    pub tfmr: i32,
    pub fet: i32,
    pub model: i32,
    pub model_text: String,
    pub stackmode: i32,
    pub stackmode_text: String,
    #[serde(rename = "AACin")]
    pub aac_in: i32,
    #[serde(rename = "AACout")]
    pub aac_out: i32,
    #[serde(rename = "Hz")]
    pub hz: f64,
    #[serde(flatten)]
    trace: BTreeMap<String, String>,
    #[serde(skip)]
    trace_enabled: bool,
}

impl InverterData {
    pub fn new(trace: bool) -> Self {
        Self {
            revision: "0.0".to_string(),
            mode: 0,
            mode_text: String::new(),
            fault: 0,
            fault_text: String::new(),
            vdc: 0.0,
            adc: 0,
            vac_out: 0,
            vac_in: 0,
            invled: 0,
            invled_text: String::new(),
            chgled: 0,
            chgled_text: String::new(),
            bat: 0,
            tfmr: 0,
            fet: 0,
            model: 0,
            model_text: String::new(),
            stackmode: 0,
            stackmode_text: String::new(),
            aac_in: 0,
            aac_out: 0,
            hz: 0.0,
            trace: BTreeMap::new(),
            trace_enabled: trace,
        }
    }

    pub fn decode(&mut self, message: &Message, ctx: &mut DecoderContext) {
        if self.trace_enabled {
            self.trace.insert(
                message.packet_type.to_string(),
                hex::encode_upper(&message.bytes),
            );
        }
        if message.packet_type != PacketType::Inverter {
            return;
        }
        let f = &message.fields;
        self.mode = f[0];
        self.fault = f[1];
        self.vdc = f64::from(f[2]) / 10.0;
        self.adc = f[3];
        self.vac_out = f[4];
        self.vac_in = f[5];
        self.invled = f[6];
        self.chgled = f[7];
        self.revision = float_str(round(f64::from(f[8]) / 10.0, 2));
        self.bat = f[9];
        self.tfmr = f[10];
        self.fet = f[11];
        self.model = f[12];
        self.stackmode = f[13];
        self.aac_in = f[14];
        self.aac_out = f[15];
        self.hz = round(f64::from(f[16]) / 10.0, 2);

        // The model number fixes the battery bank class and therefore the
        // voltage multiplier every other decoder uses from here on.
        ctx.set_multiplier_for_model(self.model as u8);

        if let Some(text) = inverter_fault_text(self.fault) {
            self.fault_text = text.to_string();
        }
        self.chgled_text = if self.chgled == 0 { "Off" } else { "On" }.to_string();
        self.invled_text = if self.invled == 0 { "Off" } else { "On" }.to_string();
        self.mode_text = inverter_mode_text(self.mode).to_string();
        self.model_text = inverter_model_text(self.model).to_string();
        self.stackmode_text = inverter_stackmode_text(self.stackmode).to_string();
    }
}

fn inverter_fault_text(fault: i32) -> Option<&'static str> {
    let text = match fault {
        0x00 => "None",
        0x01 => "STUCK RELAY",
        0x02 => "DC OVERLOAD",
        0x03 => "AC OVERLOAD",
        0x04 => "DEAD BAT",
        0x05 => "BACKFEED",
        0x08 => "LOW BAT",
        0x09 => "HIGH BAT",
        0x0A => "HIGH AC VOLTS",
        0x10 => "BAD_BRIDGE",
        0x12 => "NTC_FAULT",
        0x13 => "FET_OVERLOAD",
        0x14 => "INTERNAL_FAULT4",
        0x16 => "STACKER MODE FAULT",
        0x17 => "STACKER NO CLK FAULT",
        0x18 => "STACKER CLK PH FAULT",
        0x19 => "STACKER PH LOSS FAULT",
        0x20 => "OVER TEMP",
        0x21 => "RELAY FAULT",
        0x80 => "CHARGER_FAULT",
        0x81 => "High Battery Temp",
        0x90 => "OPEN SELCO TCO",
        0x91 => "CB3 OPEN FAULT",
        _ => return None,
    };
    Some(text)
}

fn inverter_mode_text(mode: i32) -> &'static str {
    match mode {
        0x00 => "Standby",
        0x01 => "EQ",
        0x02 => "FLOAT",
        0x04 => "ABSORB",
        0x08 => "BULK",
        0x09 => "BATSAVER",
        0x10 => "CHARGE",
        0x20 => "Off",
        0x40 => "INVERT",
        0x50 => "Inverter_Standby",
        0x80 => "SEARCH",
        _ => "??",
    }
}

fn inverter_model_text(model: i32) -> &'static str {
    match model {
        6 => "MM612",
        7 => "MM612-AE",
        8 => "MM1212",
        9 => "MMS1012",
        10 => "MM1012E",
        11 => "MM1512",
        12 => "MMS912E",
        15 => "ME1512",
        20 => "ME2012",
        21 => "RD2212",
        25 => "ME2512",
        30 => "ME3112",
        35 => "MS2012",
        36 => "MS1512E",
        40 => "MS2012E",
        44 => "MSH3012M",
        45 => "MS2812",
        47 => "MS2712E",
        53 => "MM1324E",
        54 => "MM1524",
        55 => "RD1824",
        59 => "RD2624E",
        63 => "RD2824",
        69 => "RD4024E",
        74 => "RD3924",
        90 => "MS4124E",
        91 => "MS2024",
        103 => "MSH4024M",
        104 => "MSH4024RE",
        105 => "MS4024",
        106 => "MS4024AE",
        107 => "MS4024PAE",
        111 => "MS4448AE",
        112 => "MS3748AEJ",
        114 => "MS4048",
        115 => "MS4448PAE",
        116 => "MS3748PAEJ",
        117 => "MS4348PE",
        _ => "Unknown",
    }
}

fn inverter_stackmode_text(stackmode: i32) -> &'static str {
    match stackmode {
        0x00 => "Stand Alone",
        0x01 => "Parallel stack - master",
        0x02 => "Parallel stack - slave",
        0x04 => "Series stack - master",
        0x08 => "Series stack - slave",
        _ => "Unknown",
    }
} // }}}

// PT100Device {{{
#[derive(Clone, Debug, Serialize)]
pub struct Pt100Data {
    pub address: i32,
    pub on_off: bool,
    pub mode: i32,
    pub mode_text: String,
    pub regulation: i32,
    pub regulation_text: String,
    pub fault: i32,
    pub fault_text: String,
    pub battery: f64,
    pub battery_amps: f64,
    pub pv_voltage: f64,
    pub charge_time: f64,
    pub target_battery_voltage: f64,
    pub relay_state: bool,
    pub alarm_state: bool,
    pub battery_temperature: f64,
    pub inductor_temperature: i32,
    pub fet_temperature: i32,
    pub lifetime_kwhrs: i32,
    pub resettable_kwhrs: f64,
    pub ground_fault_current: i32,
    pub nominal_battery_voltage: i32,
    pub stacker_info: i32,
    pub model: i32,
    pub output_current_rating: i32,
    pub input_voltage_rating: i32,
    pub record: i32,
    pub daily_kwh: f64,
    pub max_daily_pv_volts: i32,
    pub max_daily_pv_volts_time: f64,
    pub max_daily_battery_volts: i32,
    pub max_daily_battery_volts_time: f64,
    pub minimum_daily_battery_volts: i32,
    pub minimum_daily_battery_volts_time: f64,
    pub daily_time_operational: f64,
    pub daily_amp_hours: i32,
    pub peak_daily_power: i32,
    pub peak_daily_power_time: f64,
    pub fault_number: i32,
    pub max_battery_volts: i32,
    pub max_pv_to_battery_vdc: i32,
    pub max_battery_temperature: i32,
    pub max_fet_temperature: i32,
    pub max_inductor_temperature: i32,
    // only transmitted in the ratings sub-record, absent until then
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(flatten)]
    trace: BTreeMap<String, String>,
    #[serde(skip)]
    trace_enabled: bool,
}

impl Pt100Data {
    pub fn new(trace: bool) -> Self {
        Self {
            address: 0,
            on_off: false,
            mode: 0,
            mode_text: String::new(),
            regulation: 0,
            regulation_text: String::new(),
            fault: 0,
            fault_text: String::new(),
            battery: 0.0,
            battery_amps: 0.0,
            pv_voltage: 0.0,
            charge_time: 0.0,
            target_battery_voltage: 0.0,
            relay_state: false,
            alarm_state: false,
            battery_temperature: 0.0,
            inductor_temperature: 0,
            fet_temperature: 0,
            lifetime_kwhrs: 0,
            resettable_kwhrs: 0.0,
            ground_fault_current: 0,
            nominal_battery_voltage: 0,
            stacker_info: 0,
            model: 0,
            output_current_rating: 0,
            input_voltage_rating: 0,
            record: 0,
            daily_kwh: 0.0,
            max_daily_pv_volts: 0,
            max_daily_pv_volts_time: 0.0,
            max_daily_battery_volts: 0,
            max_daily_battery_volts_time: 0.0,
            minimum_daily_battery_volts: 0,
            minimum_daily_battery_volts_time: 0.0,
            daily_time_operational: 0.0,
            daily_amp_hours: 0,
            peak_daily_power: 0,
            peak_daily_power_time: 0.0,
            fault_number: 0,
            max_battery_volts: 0,
            max_pv_to_battery_vdc: 0,
            max_battery_temperature: 0,
            max_fet_temperature: 0,
            max_inductor_temperature: 0,
            revision: None,
            trace: BTreeMap::new(),
            trace_enabled: trace,
        }
    }

    pub fn decode(&mut self, message: &Message, ctx: &DecoderContext) {
        if self.trace_enabled {
            self.trace.insert(
                message.packet_type.to_string(),
                hex::encode_upper(&message.bytes),
            );
        }
        let f = &message.fields;
        match message.packet_type {
            PacketType::PtStatus => self.decode_status(f, ctx),
            PacketType::PtRatings => self.decode_ratings(f),
            PacketType::PtDaily => self.decode_daily(f),
            PacketType::PtFaults => self.decode_faults(f),
            _ => {}
        }
    }

    fn decode_status(&mut self, f: &[i32], ctx: &DecoderContext) {
        self.address = f[1] >> 5;
        let byte = f[2];
        self.on_off = (byte & 0x80) >> 7 != 0;
        self.mode = (byte & 0x70) >> 4;
        self.regulation = byte & 0x0F;
        self.fault = f[3] >> 3;
        self.battery = f64::from(f[4]) / 10.0;
        self.battery_amps = f64::from(f[5]) / 10.0;
        self.pv_voltage = f64::from(f[6]) / 10.0;
        self.charge_time = f64::from(f[7]) / 10.0;
        self.target_battery_voltage = f64::from(f[8]) / 10.0 * ctx.multiplier();
        let byte = f[9];
        self.relay_state = (byte & 0x80) >> 7 != 0;
        self.alarm_state = (byte & 0x70) >> 6 != 0;
        self.battery_temperature = f64::from(f[10]) / 10.0;
        self.inductor_temperature = f[11];
        self.fet_temperature = f[12];
        self.mode_text = pt_mode_text(self.mode).to_string();
        self.regulation_text = pt_regulation_text(self.regulation).to_string();
        self.fault_text = pt_fault_text(self.fault).to_string();
    }

    fn decode_ratings(&mut self, f: &[i32]) {
        self.address = f[1] >> 5;
        self.lifetime_kwhrs = f[2] * 10;
        self.resettable_kwhrs = f64::from(f[3]) / 10.0;
        self.ground_fault_current = f[4];
        self.nominal_battery_voltage = f[5] >> 2;
        self.stacker_info = f[5] & 0x03;
        self.revision = Some(float_str(f64::from(f[6]) / 10.0));
        self.model = f[7];
        self.output_current_rating = f[8];
        self.input_voltage_rating = f[9];
    }

    fn decode_daily(&mut self, f: &[i32]) {
        let short = f[1];
        self.address = (short & 0xE000) >> 13;
        self.record = short & 0x1FFF;
        self.daily_kwh = f64::from(f[2]) / 10.0;
        self.max_daily_pv_volts = f[3];
        self.max_daily_pv_volts_time = f64::from(f[4]) / 10.0;
        self.max_daily_battery_volts = f[5];
        self.max_daily_battery_volts_time = f64::from(f[6]) / 10.0;
        self.minimum_daily_battery_volts = f[7];
        self.minimum_daily_battery_volts_time = f64::from(f[8]) / 10.0;
        self.daily_time_operational = f64::from(f[7]) / 10.0;
        self.daily_amp_hours = f[10];
        self.peak_daily_power = f[11];
        self.peak_daily_power_time = f64::from(f[12]) / 10.0;
    }

    fn decode_faults(&mut self, f: &[i32]) {
        let byte = f[1];
        self.address = (byte & 0xE0) >> 5;
        self.fault_number = byte & 0x1F;
        self.max_battery_volts = f[2];
        self.max_pv_to_battery_vdc = f[3];
        self.max_battery_temperature = f[4];
        self.max_fet_temperature = f[5];
        self.max_inductor_temperature = f[6];
    }
}

fn pt_mode_text(mode: i32) -> &'static str {
    match mode {
        2 => "Sleep",
        3 => "Float",
        4 => "Bulk",
        5 => "Absorb",
        6 => "EQ",
        _ => "Unknown",
    }
}

fn pt_regulation_text(regulation: i32) -> &'static str {
    match regulation {
        0 => "Off",
        1 => "Voltage",
        2 => "Current",
        3 => "Temperature",
        4 => "Hardware",
        5 => "Voltage Off Limit",
        6 => "PPT Limit",
        7 => "Fault Limit",
        _ => "Unknown",
    }
}

fn pt_fault_text(fault: i32) -> &'static str {
    match fault {
        0 => "No Fault",
        1 => "Input er Fault",
        2 => "Output er Fault",
        3 => "PV High Fault",
        4 => "Battery High Fault",
        5 => "BTS Shorted Fault",
        6 => "FET Overtemp Fault",
        7 => "Inductor Overtemp Fault",
        8 => "Over Current Fault",
        9 => "Internal Phase Fault",
        10 => "Repeated Internal Phase Fault",
        11 => "Internal Fault 1",
        12 => "GFP Fault",
        13 => "ARC Fault",
        14 => "NTC Fault",
        15 => "FET Overload Fault",
        16 => "Stack Fault 1",
        17 => "Stack Fault 2",
        18 => "Stack Fault 3",
        19 => "High Battery Temp Fault",
        _ => "unknown",
    }
} // }}}

// RemoteDevice {{{

// Companion-device settings blocks only mean something when that companion
// is actually on the network; the registry prunes them per batch.
pub const NO_AGS: &[&str] = &[
    "genstart",
    "runtime",
    "starttemp",
    "startvdc",
    "quiettime",
    "begintime",
    "stoptime",
    "vdcstop",
    "voltstartdelay",
    "voltstopdelay",
    "maxrun",
    "socstart",
    "socstop",
    "ampstart",
    "ampsstartdelay",
    "ampstop",
    "ampsstopdelay",
    "quietbegintime",
    "quietendtime",
    "exercisedays",
    "exercisestart",
    "exerciseruntime",
    "topoff",
    "warmup",
    "cool",
];

pub const NO_BMK: &[&str] = &["batteryefficiency", "resetbmk"];

pub const NO_PT100: &[&str] = &[
    "forcechgode",
    "relayonoff",
    "buzzeronoff",
    "resetpt100",
    "address",
    "packet",
    "lognumber",
    "relayonvdc",
    "relayoffvdc",
    "relayondelayseconds",
    "relaydelayoffseconds",
    "batterytempcomp",
    "powersavetime",
    "alarmonvdc",
    "alarmoffvdc",
    "alarmdondelay",
    "alarmoffdelay",
    "eqdonetimer",
    "chargerate",
    "rebulkonsunup",
    "AbsorbVoltage",
    "FloatVoltage",
    "EqualizeVoltage",
    "AbsorbTime",
    "RebulkVoltage",
    "BatteryTemperatureCompensation",
];

#[derive(Clone, Debug, Serialize)]
pub struct RemoteData {
    pub revision: f64,
    pub action: i32,
    pub searchwatts: i32,
    pub batterysize: i32,
    pub battype: i32,
    pub absorb: f64,
    pub chargeramps: i32,
    pub ainput: i32,
    pub parallel: i32,
    pub force_charge: i32,
    pub genstart: i32,
    pub lbco: f64,
    pub vaccutout: i32,
    pub vsfloat: f64,
    #[serde(rename = "vEQ")]
    pub v_eq: f64,
    pub absorbtime: f64,
    // AGS run block (tag 0xA0)
    pub remotetimehours: i32,
    pub remotetimemins: i32,
    pub runtime: f64,
    pub starttemp: f64,
    pub startvdc: f64,
    pub quiettime: i32,
    // AGS schedule block (tag 0xA1)
    pub begintime: i32,
    pub stoptime: i32,
    pub vdcstop: f64,
    pub voltstartdelay: i32,
    pub voltstopdelay: i32,
    pub maxrun: f64,
    // AGS SOC block (tag 0xA2)
    pub socstart: i32,
    pub socstop: i32,
    pub ampstart: i32,
    pub ampsstartdelay: i32,
    pub ampstop: i32,
    pub ampsstopdelay: i32,
    // AGS exercise block (tag 0xA3)
    pub quietbegintime: i32,
    pub quietendtime: i32,
    pub exercisedays: i32,
    pub exercisestart: i32,
    pub exerciseruntime: i32,
    pub topoff: i32,
    // AGS delay block (tag 0xA4)
    pub warmup: i32,
    pub cool: i32,
    // BMK block (tag 0x80)
    pub batteryefficiency: i32,
    pub resetbmk: i32,
    // MSH hardware is not supported; decoded but never published
    #[serde(skip)]
    pub mshinputamps: i32,
    #[serde(skip)]
    pub mshcutoutvoltage: i32,
    // PT100 control block (tag 0xC0)
    pub forcechgode: i32,
    pub relayonoff: i32,
    pub buzzeronoff: i32,
    pub resetpt100: i32,
    pub address: i32,
    pub packet: i32,
    pub lognumber: i32,
    // PT100 relay block (tag 0xC1)
    pub relayonvdc: f64,
    pub relayoffvdc: f64,
    pub relayondelayseconds: i32,
    pub relaydelayoffseconds: i32,
    pub batterytempcomp: i32,
    pub powersavetime: i32,
    // PT100 alarm block (tag 0xC2)
    pub alarmonvdc: f64,
    pub alarmoffvdc: f64,
    pub alarmdondelay: i32,
    pub alarmoffdelay: i32,
    pub eqdonetimer: f64,
    pub chargerate: i32,
    pub rebulkonsunup: i32,
    // PT100 setpoint block (tag 0xC3)
    #[serde(rename = "AbsorbVoltage")]
    pub absorb_voltage: f64,
    #[serde(rename = "FloatVoltage")]
    pub float_voltage: f64,
    #[serde(rename = "EqualizeVoltage")]
    pub equalize_voltage: f64,
    #[serde(rename = "RebulkVoltage")]
    pub rebulk_voltage: f64,
    #[serde(rename = "BatteryTemperatureCompensation")]
    pub battery_temperature_compensation: i32,
    #[serde(rename = "AbsorbTime", skip_serializing_if = "Option::is_none")]
    pub absorb_time: Option<f64>,
    #[serde(flatten)]
    trace: BTreeMap<String, String>,
    #[serde(skip)]
    trace_enabled: bool,
}

impl RemoteData {
    pub fn new(trace: bool) -> Self {
        Self {
            revision: 0.0,
            action: 0,
            searchwatts: 0,
            batterysize: 0,
            battype: 0,
            absorb: 0.0,
            chargeramps: 0,
            ainput: 0,
            parallel: 0,
            force_charge: 0,
            genstart: 0,
            lbco: 0.0,
            vaccutout: 0,
            vsfloat: 0.0,
            v_eq: 0.0,
            absorbtime: 0.0,
            remotetimehours: 0,
            remotetimemins: 0,
            runtime: 0.0,
            starttemp: 0.0,
            startvdc: 0.0,
            quiettime: 0,
            begintime: 0,
            stoptime: 0,
            vdcstop: 0.0,
            voltstartdelay: 0,
            voltstopdelay: 0,
            maxrun: 0.0,
            socstart: 0,
            socstop: 0,
            ampstart: 0,
            ampsstartdelay: 0,
            ampstop: 0,
            ampsstopdelay: 0,
            quietbegintime: 0,
            quietendtime: 0,
            exercisedays: 0,
            exercisestart: 0,
            exerciseruntime: 0,
            topoff: 0,
            warmup: 0,
            cool: 0,
            batteryefficiency: 0,
            resetbmk: 0,
            mshinputamps: 0,
            mshcutoutvoltage: 0,
            forcechgode: 0,
            relayonoff: 0,
            buzzeronoff: 0,
            resetpt100: 0,
            address: 0,
            packet: 0,
            lognumber: 0,
            relayonvdc: 0.0,
            relayoffvdc: 0.0,
            relayondelayseconds: 0,
            relaydelayoffseconds: 0,
            batterytempcomp: 0,
            powersavetime: 0,
            alarmonvdc: 0.0,
            alarmoffvdc: 0.0,
            alarmdondelay: 0,
            alarmoffdelay: 0,
            eqdonetimer: 0.0,
            chargerate: 0,
            rebulkonsunup: 0,
            absorb_voltage: 0.0,
            float_voltage: 0.0,
            equalize_voltage: 0.0,
            rebulk_voltage: 0.0,
            battery_temperature_compensation: 0,
            absorb_time: None,
            trace: BTreeMap::new(),
            trace_enabled: trace,
        }
    }

    // The first fourteen bytes are identical across all remote variants.
    fn set_base_values(&mut self, f: &[i32], ctx: &DecoderContext) {
        self.action = f[0];
        self.searchwatts = f[1];
        // nonlinear encoding straight from the ME documentation
        self.batterysize = f[2] * 2 + 200;
        let value = f[3];
        if value > 100 {
            self.absorb = f64::from(value) * ctx.multiplier() / 10.0;
            self.battype = 0;
        } else {
            self.absorb = 0.0;
            self.battype = value;
        }
        self.chargeramps = f[4];
        self.ainput = f[5];
        self.revision = f64::from(f[6]) / 10.0;
        let value = f[7];
        self.parallel = (value & 0x0F) * 10;
        self.force_charge = (value & 0xF0) >> 4;
        self.genstart = f[8];
        self.lbco = f64::from(f[9]) / 10.0;
        self.vaccutout = f[10];
        self.vsfloat = f64::from(f[11]) * ctx.multiplier() / 10.0;
        self.v_eq = self.absorb + f64::from(f[12]) / 10.0;
        self.absorbtime = f64::from(f[13]) / 10.0;
    }

    pub fn decode(&mut self, message: &Message, ctx: &DecoderContext) {
        let tag = match message.packet_type {
            PacketType::Remote(tag) => tag,
            _ => return,
        };
        if self.trace_enabled {
            self.trace.insert(
                message.packet_type.to_string(),
                hex::encode_upper(&message.bytes),
            );
        }
        let f = &message.fields;
        self.set_base_values(f, ctx);

        match tag {
            RemoteTag::Base | RemoteTag::PtLog => {}
            RemoteTag::Msh => {
                self.mshinputamps = f[14];
                self.mshcutoutvoltage = f[15];
            }
            RemoteTag::Bmk => {
                self.remotetimehours = f[14];
                self.remotetimemins = f[15];
                self.batteryefficiency = f[16];
                self.resetbmk = f[17];
            }
            RemoteTag::AgsRun => {
                self.remotetimehours = f[14];
                self.remotetimemins = f[15];
                self.runtime = f64::from(f[16]) / 10.0;
                self.starttemp = fahrenheit_to_celsius(f64::from(f[17]));
                self.startvdc = f64::from(f[18]) * ctx.multiplier() / 10.0;
                self.quiettime = f[19];
            }
            RemoteTag::AgsSchedule => {
                self.begintime = quarter_hours_to_hhmm(f[14]);
                self.stoptime = quarter_hours_to_hhmm(f[15]);
                self.vdcstop = f64::from(f[16]) * ctx.multiplier() / 10.0;
                self.voltstartdelay = nibble_delay(f[17]);
                self.voltstopdelay = nibble_delay(f[18]);
                self.maxrun = f64::from(f[19]) / 10.0;
            }
            RemoteTag::AgsSoc => {
                self.socstart = f[14];
                self.socstop = f[15];
                self.ampstart = f[16];
                self.ampsstartdelay = nibble_delay(f[17]);
                self.ampstop = f[18];
                self.ampsstopdelay = nibble_delay(f[19]);
            }
            RemoteTag::AgsExercise => {
                self.quietbegintime = quarter_hours_to_hhmm(f[14]);
                self.quietendtime = quarter_hours_to_hhmm(f[15]);
                self.exercisestart = quarter_hours_to_hhmm(f[16]);
                self.runtime = f64::from(f[17]) / 10.0;
                self.topoff = f[18];
            }
            RemoteTag::AgsDelays => {
                self.warmup = nibble_delay(f[14]);
                self.cool = nibble_delay(f[15]);
            }
            RemoteTag::PtControl => {
                self.forcechgode = f[14] & 0x03;
                let byte = f[15];
                self.relayonoff = (byte & 0x60) >> 6;
                self.buzzeronoff = (byte & 0x30) >> 4;
                self.resetpt100 = f[16];
                let byte = f[17];
                self.address = byte >> 5;
                self.packet = byte & 0x1F;
                self.lognumber = f[18];
            }
            RemoteTag::PtRelay => {
                self.relayonvdc = f64::from(f[14]) / 10.0 * ctx.multiplier();
                self.relayoffvdc = f64::from(f[15]) / 10.0 * ctx.multiplier();
                self.relayondelayseconds = signed_delay(f[16]);
                self.relaydelayoffseconds = signed_delay(f[17]);
                self.batterytempcomp = f[18];
                self.powersavetime = f[19] >> 2;
            }
            RemoteTag::PtAlarm => {
                self.alarmonvdc = f64::from(f[14]) / 10.0 * ctx.multiplier();
                self.alarmoffvdc = f64::from(f[15]) / 10.0 * ctx.multiplier();
                self.alarmdondelay = signed_delay(f[16]);
                self.alarmoffdelay = signed_delay(f[17]);
                self.eqdonetimer = f64::from(f[18]) / 10.0;
                let byte = f[19];
                self.chargerate = (byte & 0xFE) >> 1;
                self.rebulkonsunup = byte & 0x01;
            }
            RemoteTag::PtSetpoints => {
                self.absorb_voltage = f64::from(f[14]) / 10.0 * ctx.multiplier();
                self.float_voltage = f64::from(f[15]) / 10.0 * ctx.multiplier();
                self.equalize_voltage = f64::from(f[16]) / 10.0 * ctx.multiplier();
                self.absorb_time = Some(f64::from(f[17]) / 10.0);
                // f[18] is reserved
                self.rebulk_voltage = f64::from(f[19]) / 10.0 * ctx.multiplier();
                self.battery_temperature_compensation = f[20];
            }
        }
    }
} // }}}

// RTRDevice {{{
#[derive(Clone, Debug, Serialize)]
pub struct RtrData {
    pub revision: String,
    #[serde(flatten)]
    trace: BTreeMap<String, String>,
    #[serde(skip)]
    trace_enabled: bool,
}

impl RtrData {
    pub fn new(trace: bool) -> Self {
        Self {
            revision: "0.0".to_string(),
            trace: BTreeMap::new(),
            trace_enabled: trace,
        }
    }

    pub fn decode(&mut self, message: &Message) {
        if self.trace_enabled {
            self.trace.insert(
                message.packet_type.to_string(),
                hex::encode_upper(&message.bytes),
            );
        }
        if message.packet_type == PacketType::Rtr {
            let revision = (f64::from(message.fields[1]) / 10.0).round() as i32;
            self.revision = revision.to_string();
        }
    }
} // }}}

// Registry {{{

/// Holds one long-lived, cumulative record per device kind.
///
/// Records are created lazily on the first packet of their kind and then
/// mutated in place for the rest of the process lifetime; fields a packet
/// does not touch keep their previous value, which matters for the rarely
/// transmitted sub-records (AGS counters, PT100 daily statistics).
#[derive(Debug)]
pub struct Registry {
    trace: bool,
    inverter: Option<InverterData>,
    remote: Option<RemoteData>,
    bmk: Option<BmkData>,
    ags: Option<AgsData>,
    rtr: Option<RtrData>,
    pt100: Option<Pt100Data>,
}

impl Registry {
    pub fn new(trace: bool) -> Self {
        Self {
            trace,
            inverter: None,
            remote: None,
            bmk: None,
            ags: None,
            rtr: None,
            pt100: None,
        }
    }

    /// Dispatch every packet in the batch to its owning decoder.
    ///
    /// Inverter packets go first: they are the only source of the voltage
    /// multiplier, and nothing on the wire guarantees they arrive before
    /// the packets that need it.
    pub fn update(&mut self, batch: &[Message], ctx: &mut DecoderContext) {
        for message in batch {
            if message.packet_type == PacketType::Inverter {
                self.inverter
                    .get_or_insert_with(|| InverterData::new(self.trace))
                    .decode(message, ctx);
            }
        }

        for message in batch {
            match message.packet_type {
                PacketType::Unknown | PacketType::Inverter => {}
                PacketType::Remote(_) => self
                    .remote
                    .get_or_insert_with(|| RemoteData::new(self.trace))
                    .decode(message, ctx),
                PacketType::BmkStatus => self
                    .bmk
                    .get_or_insert_with(|| BmkData::new(self.trace))
                    .decode(message),
                PacketType::AgsStatus | PacketType::AgsCounters => self
                    .ags
                    .get_or_insert_with(|| AgsData::new(self.trace))
                    .decode(message, ctx),
                PacketType::Rtr => self
                    .rtr
                    .get_or_insert_with(|| RtrData::new(self.trace))
                    .decode(message),
                PacketType::PtStatus
                | PacketType::PtRatings
                | PacketType::PtDaily
                | PacketType::PtFaults => self
                    .pt100
                    .get_or_insert_with(|| Pt100Data::new(self.trace))
                    .decode(message, ctx),
            }
        }
    }

    /// Deep-copied view of every record constructed so far.
    ///
    /// Remote companion blocks are pruned against the devices seen in the
    /// *current* batch: the remote panel reports AGS/BMK/PT100 settings
    /// whether or not those companions exist, so their blocks are only
    /// meaningful when the companion itself showed up this cycle.
    pub fn snapshot(&self, batch: &[Message]) -> Result<Vec<Reading>> {
        let has_ags = batch.iter().any(|m| m.packet_type.is_ags());
        let has_bmk = batch.iter().any(|m| m.packet_type == PacketType::BmkStatus);
        let has_pt100 = batch.iter().any(|m| m.packet_type.is_pt100());

        let mut readings = Vec::new();

        if let Some(inverter) = &self.inverter {
            readings.push(to_reading(INVERTER, inverter)?);
        }
        if let Some(remote) = &self.remote {
            let mut reading = to_reading(REMOTE, remote)?;
            prune_remote(&mut reading.data, has_ags, has_bmk, has_pt100);
            readings.push(reading);
        }
        if let Some(bmk) = &self.bmk {
            readings.push(to_reading(BMK, bmk)?);
        }
        if let Some(ags) = &self.ags {
            readings.push(to_reading(AGS, ags)?);
        }
        if let Some(rtr) = &self.rtr {
            readings.push(to_reading(RTR, rtr)?);
        }
        if let Some(pt100) = &self.pt100 {
            readings.push(to_reading(PT100, pt100)?);
        }

        Ok(readings)
    }
}

fn to_reading<T: Serialize>(device: &str, record: &T) -> Result<Reading> {
    Ok(Reading {
        item: device.to_string(),
        data: serde_json::to_value(record)?,
    })
}

fn prune_remote(data: &mut Value, has_ags: bool, has_bmk: bool, has_pt100: bool) {
    let map = match data.as_object_mut() {
        Some(map) => map,
        None => return,
    };

    let mut drop: Vec<&str> = Vec::new();
    if !has_ags {
        drop.extend_from_slice(NO_AGS);
    }
    if !has_bmk {
        drop.extend_from_slice(NO_BMK);
    }
    if !has_pt100 {
        drop.extend_from_slice(NO_PT100);
    }

    map.retain(|key, _| !drop.contains(&key.as_str()));
} // }}}
