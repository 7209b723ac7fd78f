//! Register access and reset line seams.

use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{Error as _, ErrorKind};
use embedded_hal_async::i2c::I2c;

use crate::error::TransportError;

/// Register level access to the touch controller.
///
/// Only [`read_block`](RegisterTransport::read_block) and [`write`](RegisterTransport::write) are mandatory, single
/// register access is built on top of them.
pub trait RegisterTransport {
    /// Send `cmd` and read `buf.len()` bytes back.
    async fn read_block(&mut self, cmd: &[u8], buf: &mut [u8]) -> Result<(), TransportError>;

    /// Send raw bytes.
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    async fn read_reg(&mut self, reg: u8) -> Result<u8, TransportError> {
        let mut value = [0u8];
        self.read_block(&[reg], &mut value).await?;
        Ok(value[0])
    }

    async fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), TransportError> {
        self.write(&[reg, value]).await
    }
}

/// Hardware reset line of the controller.
pub trait ResetLine {
    /// Pulse reset and wait `settle` for the controller to boot.
    async fn pulse(&mut self, settle: Duration);

    /// Keep the controller in reset.
    fn hold(&mut self);
}

/// [`RegisterTransport`] over an async I2C bus.
pub struct I2cTransport<I2C: I2c> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cTransport<I2C> {
    pub const DEFAULT_ADDRESS: u8 = 0x38;

    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

fn map_i2c_error(kind: ErrorKind) -> TransportError {
    match kind {
        ErrorKind::NoAcknowledge(_) => TransportError::Nack,
        _ => TransportError::Bus,
    }
}

impl<I2C: I2c> RegisterTransport for I2cTransport<I2C> {
    async fn read_block(&mut self, cmd: &[u8], buf: &mut [u8]) -> Result<(), TransportError> {
        self.i2c
            .write_read(self.address, cmd, buf)
            .await
            .map_err(|e| map_i2c_error(e.kind()))
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.i2c
            .write(self.address, data)
            .await
            .map_err(|e| map_i2c_error(e.kind()))
    }
}

/// [`ResetLine`] driven by an active-low GPIO.
pub struct GpioReset<P: OutputPin> {
    pin: P,
}

impl<P: OutputPin> GpioReset<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: OutputPin> ResetLine for GpioReset<P> {
    async fn pulse(&mut self, settle: Duration) {
        if self.pin.set_low().is_err() {
            warn!("Failed to assert touch reset");
        }
        Timer::after_millis(1).await;
        if self.pin.set_high().is_err() {
            warn!("Failed to release touch reset");
        }
        if settle.as_ticks() > 0 {
            Timer::after(settle).await;
        }
    }

    fn hold(&mut self) {
        if self.pin.set_low().is_err() {
            warn!("Failed to assert touch reset");
        }
    }
}
