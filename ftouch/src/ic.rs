//! Chip identification.

use embassy_time::{Duration, Timer};

use crate::config::TouchConfig;
use crate::error::Error;
use crate::transport::{RegisterTransport, ResetLine};

/// Ids a chip variant answers with, depending on what is running on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipType {
    pub kind: u16,
    /// Id reported by the running firmware
    pub chip_idh: u8,
    pub chip_idl: u8,
    /// Id reported by the boot rom
    pub rom_idh: u8,
    pub rom_idl: u8,
    /// Id reported by the programming bootloader
    pub pb_idh: u8,
    pub pb_idl: u8,
    /// Id reported by the flash bootloader
    pub bl_idh: u8,
    pub bl_idl: u8,
}

/// Alternative chip ids, as `(high << 8) | low`, accepted for a chip variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipIdMap {
    pub kind: u16,
    pub chip_ids: &'static [u16],
}

impl ChipIdMap {
    fn contains(&self, id: u16) -> bool {
        self.chip_ids.contains(&id)
    }

    fn contains_high(&self, id_h: u8) -> bool {
        self.chip_ids.iter().any(|&cid| {
            let cid_h = (cid >> 8) as u8;
            cid_h != 0 && cid_h == id_h
        })
    }
}

/// Identified controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IcInfo {
    pub chip: ChipType,
    pub compatible: Option<ChipIdMap>,
    pub is_incell: bool,
}

impl IcInfo {
    /// Whether `id_h`, read from the chip id register, belongs to this chip.
    pub fn accepts(&self, id_h: u8) -> bool {
        id_h == self.chip.chip_idh || self.compatible.is_some_and(|map| map.contains_high(id_h))
    }
}

/// Look `id_h:id_l` up in the chip tables.
///
/// With `fw_valid` the id comes from running firmware and is matched against the chip ids and the compatible id
/// maps, otherwise against the rom, programming bootloader and flash bootloader ids.
pub fn resolve(
    chip_types: &[ChipType],
    chip_id_maps: &[ChipIdMap],
    id_h: u8,
    id_l: u8,
    fw_valid: bool,
    is_incell: bool,
) -> Option<IcInfo> {
    if id_h == 0 || id_l == 0 {
        error!("Chip id {:#x}{:#x} contains zero", id_h, id_l);
        return None;
    }
    debug!("Verify chip id {:#x}", u16::from_be_bytes([id_h, id_l]));

    let id = u16::from_be_bytes([id_h, id_l]);
    let map_for = |kind: u16| chip_id_maps.iter().find(|m| m.kind == kind).copied();

    let chip = chip_types.iter().find(|t| {
        if fw_valid {
            (id_h == t.chip_idh && id_l == t.chip_idl) || map_for(t.kind).is_some_and(|m| m.contains(id))
        } else {
            (id_h == t.rom_idh && id_l == t.rom_idl)
                || (id_h == t.pb_idh && id_l == t.pb_idl)
                || (id_h == t.bl_idh && id_l == t.bl_idl)
        }
    })?;

    Some(IcInfo {
        chip: *chip,
        compatible: map_for(chip.kind),
        is_incell,
    })
}

/// Read the two byte boot id.
async fn read_boot_id<T: RegisterTransport>(transport: &mut T, config: &TouchConfig) -> Result<[u8; 2], Error> {
    let boot = &config.boot;
    transport.write(&boot.start).await?;
    Timer::after(boot.start_delay).await;

    let cmd = [boot.read_id, 0, 0, 0];
    let len = if config.is_incell {
        boot.read_id_len_incell
    } else {
        boot.read_id_len
    }
    .clamp(1, cmd.len());
    let mut id = [0u8; 2];
    transport.read_block(&cmd[..len], &mut id).await?;
    if id[0] == 0 || id[1] == 0 {
        error!("Read boot id failed, got {:#x} {:#x}", id[0], id[1]);
        return Err(Error::NotIdentified);
    }
    Ok(id)
}

/// Reset the controller into its boot rom and identify it from the boot id.
pub async fn identify<T: RegisterTransport, R: ResetLine>(
    transport: &mut T,
    reset: &mut R,
    config: &TouchConfig,
) -> Result<IcInfo, Error> {
    for attempt in 0..config.boot.retries {
        reset.pulse(Duration::from_ticks(0)).await;
        Timer::after(config.boot.start_delay).await;

        let id = match read_boot_id(transport, config).await {
            Ok(id) => id,
            Err(e) => {
                debug!("Read boot id failed: {:?}, retry: {}", e, attempt);
                continue;
            }
        };

        match resolve(config.chip_types, config.chip_id_maps, id[0], id[1], false, config.is_incell) {
            Some(info) => {
                info!(
                    "Touch chip identified, chip id: {:#x}{:#x}, type: {:#x}",
                    info.chip.chip_idh, info.chip.chip_idl, info.chip.kind
                );
                return Ok(info);
            }
            None => debug!("Unknown boot id {:#x}{:#x}, retry: {}", id[0], id[1], attempt),
        }
    }

    error!("Failed to identify the touch chip");
    Err(Error::NotIdentified)
}
