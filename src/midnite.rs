use std::net::SocketAddr;

use serde::Serialize;
use tokio_modbus::client::{tcp, Client, Context, Reader as ModbusReader};
use tokio_modbus::slave::Slave;

use crate::prelude::*;

// (start address, register count) for every block the Classic exposes that
// we care about. Addresses are the zero-based Modbus addresses, one less
// than the register numbers in Midnite's documentation.
const BLOCK_UNIT_INFO: (u16, u16) = (4100, 44);
const BLOCK_WHIZBANG: (u16, u16) = (4360, 22);
const BLOCK_MPPT: (u16, u16) = (4163, 2);
const BLOCK_NAME: (u16, u16) = (4209, 4);
const BLOCK_CHARGE: (u16, u16) = (4243, 32);
const BLOCK_REVISIONS: (u16, u16) = (16386, 4);

/// Walks a block of holding registers as a byte stream.
///
/// Each register contributes its two bytes most-significant first; 32-bit
/// values span two registers with the *low* word transmitted first, which is
/// how the Classic lays out its long registers.
struct RegisterDecoder<'a> {
    regs: &'a [u16],
    pos: usize,
}

impl<'a> RegisterDecoder<'a> {
    fn new(regs: &'a [u16]) -> Self {
        Self { regs, pos: 0 }
    }

    fn byte(&mut self) -> u8 {
        let reg = self.regs[self.pos / 2];
        let byte = if self.pos % 2 == 0 {
            (reg >> 8) as u8
        } else {
            (reg & 0xFF) as u8
        };
        self.pos += 1;
        byte
    }

    fn skip(&mut self, bytes: usize) {
        self.pos += bytes;
    }

    fn u8(&mut self) -> u16 {
        u16::from(self.byte())
    }

    fn i8(&mut self) -> i16 {
        i16::from(self.byte() as i8)
    }

    fn u16(&mut self) -> u16 {
        let hi = self.byte();
        let lo = self.byte();
        u16::from_be_bytes([hi, lo])
    }

    fn i16(&mut self) -> i16 {
        self.u16() as i16
    }

    fn u32(&mut self) -> u32 {
        let low_word = self.u16();
        let high_word = self.u16();
        (u32::from(high_word) << 16) | u32::from(low_word)
    }

    fn i32(&mut self) -> i32 {
        self.u32() as i32
    }
}

// ClassicData {{{
/// Cumulative Classic state, republished whole every cycle. Blocks that
/// fail to read keep their previous values.
#[derive(Clone, Debug, Serialize)]
pub struct ClassicData {
    pub pcb_revision: u16,
    pub unit_type: u16,
    pub build_year: u16,
    pub build_month: u16,
    pub build_day: u16,
    pub info_flag_bits_3: u16,
    pub mac_1: u16,
    pub mac_0: u16,
    pub mac_3: u16,
    pub mac_2: u16,
    pub mac_5: u16,
    pub mac_4: u16,
    pub unit_id: i32,
    pub status_roll: u16,
    pub restart_timer_ms: u16,
    pub avg_battery_voltage: f64,
    pub avg_pv_voltage: f64,
    pub avg_battery_current: f64,
    pub avg_energy_today: f64,
    pub avg_power: f64,
    pub avg_pv_current: f64,
    pub charge_stage: u16,
    pub charge_state: u16,
    pub last_voc: f64,
    pub highest_pv_voltage_seen: u16,
    pub match_point_shadow: u16,
    pub amphours_today: u16,
    pub lifetime_energy: f64,
    pub lifetime_amphours: u32,
    pub info_flags_bits: i32,
    pub battery_temperature: f64,
    pub fet_temperature: f64,
    pub pcb_temperature: f64,
    pub no_power_timer: u16,
    pub log_interval: u16,
    pub modbus_port_register: u16,
    pub float_time_today: u16,
    pub absorb_time: u16,
    pub pwm_readonly: u16,
    pub reason_for_reset: u16,
    pub equalize_time: u16,
    pub wbjr_cmd_s: u16,
    pub wbjr_raw_current: i16,
    pub wbjr_pos_amphour: u32,
    pub wbjr_neg_amphour: i32,
    pub wbjr_net_amphour: i32,
    pub wbjr_battery_current: f64,
    pub wbjr_crc: i16,
    pub shunt_temperature: f64,
    pub soc: u16,
    pub remaining_amphours: u16,
    pub total_amphours: u16,
    pub mppt_mode: u16,
    pub aux1_and_2_function: i16,
    pub name_0: u16,
    pub name_1: u16,
    pub name_2: u16,
    pub name_3: u16,
    pub name_4: u16,
    pub name_5: u16,
    pub name_6: u16,
    pub name_7: u16,
    pub temp_regulated_battery_target_voltage: f64,
    pub nominal_battery_voltage: u16,
    pub ending_amps: f64,
    pub reason_for_resting: u16,
    pub app_rev: u32,
    pub net_rev: u32,
}

impl Default for ClassicData {
    fn default() -> Self {
        Self {
            pcb_revision: 0,
            unit_type: 0,
            build_year: 0,
            build_month: 0,
            build_day: 0,
            info_flag_bits_3: 0,
            mac_1: 0,
            mac_0: 0,
            mac_3: 0,
            mac_2: 0,
            mac_5: 0,
            mac_4: 0,
            unit_id: 0,
            status_roll: 0,
            restart_timer_ms: 0,
            avg_battery_voltage: 0.0,
            avg_pv_voltage: 0.0,
            avg_battery_current: 0.0,
            avg_energy_today: 0.0,
            avg_power: 0.0,
            avg_pv_current: 0.0,
            charge_stage: 0,
            charge_state: 0,
            last_voc: 0.0,
            highest_pv_voltage_seen: 0,
            match_point_shadow: 0,
            amphours_today: 0,
            lifetime_energy: 0.0,
            lifetime_amphours: 0,
            info_flags_bits: 0,
            battery_temperature: 0.0,
            fet_temperature: 0.0,
            pcb_temperature: 0.0,
            no_power_timer: 0,
            log_interval: 0,
            modbus_port_register: 0,
            float_time_today: 0,
            absorb_time: 0,
            pwm_readonly: 0,
            reason_for_reset: 0,
            equalize_time: 0,
            wbjr_cmd_s: 0,
            wbjr_raw_current: 0,
            wbjr_pos_amphour: 0,
            wbjr_neg_amphour: 0,
            wbjr_net_amphour: 0,
            wbjr_battery_current: 0.0,
            wbjr_crc: 0,
            shunt_temperature: 0.0,
            soc: 0,
            remaining_amphours: 0,
            total_amphours: 0,
            mppt_mode: 0,
            aux1_and_2_function: 0,
            name_0: 0,
            name_1: 0,
            name_2: 0,
            name_3: 0,
            name_4: 0,
            name_5: 0,
            name_6: 0,
            name_7: 0,
            temp_regulated_battery_target_voltage: 0.0,
            nominal_battery_voltage: 0,
            ending_amps: 0.0,
            reason_for_resting: 0,
            app_rev: 0,
            net_rev: 0,
        }
    }
}

impl ClassicData {
    pub fn apply(&mut self, addr: u16, regs: &[u16]) {
        match addr {
            4100 => self.apply_unit_info(regs),
            4360 => self.apply_whizbang(regs),
            4163 => self.apply_mppt(regs),
            4209 => self.apply_name(regs),
            4243 => self.apply_charge(regs),
            16386 => self.apply_revisions(regs),
            _ => {}
        }
    }

    fn apply_unit_info(&mut self, regs: &[u16]) {
        let mut d = RegisterDecoder::new(regs);
        self.pcb_revision = d.u8();
        self.unit_type = d.u8();
        self.build_year = d.u16();
        self.build_month = d.u8();
        self.build_day = d.u8();
        self.info_flag_bits_3 = d.u16();
        d.skip(2);
        self.mac_1 = d.u8();
        self.mac_0 = d.u8();
        self.mac_3 = d.u8();
        self.mac_2 = d.u8();
        self.mac_5 = d.u8();
        self.mac_4 = d.u8();
        d.skip(4);
        self.unit_id = d.i32();
        self.status_roll = d.u16();
        self.restart_timer_ms = d.u16();
        self.avg_battery_voltage = f64::from(d.i16()) / 10.0;
        self.avg_pv_voltage = f64::from(d.u16()) / 10.0;
        self.avg_battery_current = f64::from(d.u16()) / 10.0;
        self.avg_energy_today = f64::from(d.u16()) / 10.0;
        self.avg_power = f64::from(d.u16());
        self.charge_stage = d.u8();
        self.charge_state = d.u8();
        self.avg_pv_current = f64::from(d.u16()) / 10.0;
        self.last_voc = f64::from(d.u16()) / 10.0;
        self.highest_pv_voltage_seen = d.u16();
        self.match_point_shadow = d.u16();
        self.amphours_today = d.u16();
        self.lifetime_energy = f64::from(d.u32()) / 10.0;
        self.lifetime_amphours = d.u32();
        self.info_flags_bits = d.i32();
        self.battery_temperature = f64::from(d.i16()) / 10.0;
        self.fet_temperature = f64::from(d.i16()) / 10.0;
        self.pcb_temperature = f64::from(d.i16()) / 10.0;
        self.no_power_timer = d.u16();
        self.log_interval = d.u16();
        self.modbus_port_register = d.u16();
        self.float_time_today = d.u16();
        self.absorb_time = d.u16();
        d.skip(2);
        self.pwm_readonly = d.u16();
        self.reason_for_reset = d.u16();
        self.equalize_time = d.u16();
    }

    fn apply_whizbang(&mut self, regs: &[u16]) {
        let mut d = RegisterDecoder::new(regs);
        self.wbjr_cmd_s = d.u16();
        self.wbjr_raw_current = d.i16();
        d.skip(4);
        self.wbjr_pos_amphour = d.u32();
        self.wbjr_neg_amphour = d.i32();
        self.wbjr_net_amphour = d.i32();
        self.wbjr_battery_current = f64::from(d.i16()) / 10.0;
        self.wbjr_crc = d.i8();
        self.shunt_temperature = f64::from(d.i8()) - 50.0;
        self.soc = d.u16();
        d.skip(6);
        self.remaining_amphours = d.u16();
        d.skip(6);
        self.total_amphours = d.u16();
    }

    fn apply_mppt(&mut self, regs: &[u16]) {
        let mut d = RegisterDecoder::new(regs);
        self.mppt_mode = d.u16();
        self.aux1_and_2_function = d.i16();
    }

    fn apply_name(&mut self, regs: &[u16]) {
        let mut d = RegisterDecoder::new(regs);
        self.name_0 = d.u8();
        self.name_1 = d.u8();
        self.name_2 = d.u8();
        self.name_3 = d.u8();
        self.name_4 = d.u8();
        self.name_5 = d.u8();
        self.name_6 = d.u8();
        self.name_7 = d.u8();
    }

    fn apply_charge(&mut self, regs: &[u16]) {
        let mut d = RegisterDecoder::new(regs);
        self.temp_regulated_battery_target_voltage = f64::from(d.i16()) / 10.0;
        self.nominal_battery_voltage = d.u16();
        self.ending_amps = f64::from(d.i16()) / 10.0;
        d.skip(56);
        self.reason_for_resting = d.u16();
    }

    fn apply_revisions(&mut self, regs: &[u16]) {
        let mut d = RegisterDecoder::new(regs);
        self.app_rev = d.u32();
        self.net_rev = d.u32();
    }
} // }}}

pub struct Midnite {
    config: config::Midnite,
    classic: ClassicData,
}

impl Midnite {
    pub fn new(config: &config::Midnite) -> Self {
        Self {
            config: config.clone(),
            classic: ClassicData::default(),
        }
    }

    async fn read_block(&self, ctx: &mut Context, block: (u16, u16)) -> Result<Vec<u16>> {
        let (addr, count) = block;
        let regs = ctx
            .read_holding_registers(addr, count)
            .await
            .map_err(|err| anyhow!("reading {} registers at {}: {}", count, addr, err))?
            .map_err(|exc| anyhow!("reading {} registers at {}: {}", count, addr, exc))?;

        if regs.len() != count as usize {
            bail!("register block {} returned {} of {} registers", addr, regs.len(), count);
        }

        Ok(regs)
    }
}

#[async_trait::async_trait]
impl Reader for Midnite {
    fn name(&self) -> &'static str {
        "midnite"
    }

    async fn poll(&mut self) -> Result<Vec<Reading>> {
        let endpoint = format!("{}:{}", self.config.host, self.config.port);
        let socket: SocketAddr = tokio::net::lookup_host(&endpoint)
            .await?
            .next()
            .ok_or_else(|| anyhow!("{} does not resolve", endpoint))?;

        let mut ctx = tcp::connect_slave(socket, Slave(self.config.unit)).await?;

        for block in [
            BLOCK_UNIT_INFO,
            BLOCK_WHIZBANG,
            BLOCK_MPPT,
            BLOCK_NAME,
            BLOCK_CHARGE,
            BLOCK_REVISIONS,
        ] {
            match self.read_block(&mut ctx, block).await {
                Ok(regs) => self.classic.apply(block.0, &regs),
                Err(err) => warn!("midnite: skipping block: {}", err),
            }
        }

        ctx.disconnect().await?;

        Ok(vec![Reading {
            item: "Classic".to_string(),
            data: serde_json::to_value(&self.classic)?,
        }])
    }
}
