//! Wait for the controller firmware to come up.

use embassy_time::Timer;

use crate::config::ValidityConfig;
use crate::error::Error;
use crate::ic::IcInfo;
use crate::transport::RegisterTransport;

/// Poll the chip id register until it reports an id belonging to `ic`.
///
/// Returns the id read on success and [`Error::Timeout`] once `timeout` has been spent polling. There is no retry
/// beyond that, the caller decides whether the surrounding operation fails.
pub async fn wait_until_valid<T: RegisterTransport>(
    transport: &mut T,
    ic: &IcInfo,
    config: &ValidityConfig,
) -> Result<u8, Error> {
    let interval = config.interval.as_ticks().max(1);
    let mut elapsed = 0u64;
    loop {
        match transport.read_reg(config.chip_id_reg).await {
            Ok(id) if ic.accepts(id) => {
                info!("Touch ready, device id: {:#x}", id);
                return Ok(id);
            }
            Ok(id) => debug!("Touch not ready, read: {:#x}", id),
            Err(e) => debug!("Touch not ready, read failed: {:?}", e),
        }

        elapsed += interval;
        if elapsed >= config.timeout.as_ticks() {
            error!("Touch did not become valid in {}ms", config.timeout.as_millis());
            return Err(Error::Timeout);
        }
        Timer::after(config.interval).await;
    }
}
