pub mod device;
pub mod packet;

use bytes::BytesMut;
use tokio::io::AsyncReadExt;
use tokio_serial::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, StopBits};

use crate::prelude::*;

use device::Registry;
use packet::{DecoderContext, Message, PacketType};

const BAUD_RATE: u32 = 19200;

/// Bus traffic keeps flowing while we open the port; waiting this long
/// before the first read avoids starting mid-packet more often than not.
const SETTLE_TIME: Duration = Duration::from_millis(250);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no traffic on {device}")]
    NoTraffic { device: String },

    #[error("{packet_type} packet is {actual} bytes, layout needs {expected}")]
    LayoutMismatch {
        packet_type: PacketType,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Serial(#[from] tokio_serial::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Magnum {
    config: config::Magnum,
    context: DecoderContext,
    registry: Registry,
}

impl Magnum {
    pub fn new(config: &config::Magnum) -> Self {
        Self {
            config: config.clone(),
            context: DecoderContext::new(),
            registry: Registry::new(config.trace),
        }
    }

    /// Accumulate one cycle's worth of packets off the serial bus.
    ///
    /// The wire has no framing, so a packet ends when the line goes quiet
    /// for longer than the configured gap. Each `read()` is raced against
    /// that gap; bytes that arrive in time extend the current packet and an
    /// expired timer flushes it.
    async fn read_packets(&self) -> Result<Vec<bytes::Bytes>, Error> {
        let mut port = tokio_serial::new(&self.config.device, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open_native_async()?;

        tokio::time::sleep(SETTLE_TIME).await;

        if port.bytes_to_read()? == 0 {
            return Err(Error::NoTraffic {
                device: self.config.device.clone(),
            });
        }

        // Drop whatever accumulated during the settle window; it almost
        // certainly starts mid-packet.
        port.clear(ClearBuffer::Input)?;

        let gap = Duration::from_millis(self.config.timeout_ms);
        let mut packets = Vec::with_capacity(self.config.packets);
        let mut packet = BytesMut::new();
        let mut buf = [0u8; 256];

        while packets.len() < self.config.packets {
            match tokio::time::timeout(gap, port.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "serial port closed",
                    )))
                }
                Ok(Ok(n)) => packet.extend_from_slice(&buf[..n]),
                Ok(Err(err)) => return Err(Error::Io(err)),
                Err(_elapsed) => {
                    if !packet.is_empty() {
                        packets.push(packet.split().freeze());
                    }
                }
            }
        }

        Ok(packets)
    }

    fn decode(&mut self, raw_packets: Vec<bytes::Bytes>) -> Vec<Message> {
        let mut batch: Vec<Message> = Vec::with_capacity(raw_packets.len());

        for raw in raw_packets {
            match packet::parse(raw, &mut self.context) {
                Ok(message) => batch.push(message),
                Err(err) => error!("magnum: dropping packet: {}", err),
            }
        }

        let unknown = batch
            .iter()
            .filter(|m| m.packet_type == PacketType::Unknown)
            .count();
        if unknown > 1 && self.config.clean_packets {
            debug!("magnum: {} unclassified packets, merging fragments", unknown);
            batch = packet::cleanup(batch, &mut self.context);
        }

        batch
    }
}

#[async_trait::async_trait]
impl Reader for Magnum {
    fn name(&self) -> &'static str {
        "magnum"
    }

    async fn poll(&mut self) -> Result<Vec<Reading>> {
        let raw_packets = self.read_packets().await?;
        trace!("magnum: {} packets this cycle", raw_packets.len());

        let batch = self.decode(raw_packets);
        self.registry.update(&batch, &mut self.context);
        self.registry.snapshot(&batch)
    }
}
