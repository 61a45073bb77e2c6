use log::info;
use payload_dcdir::{DcDir, DcDirResult, Region};
use payload_storage::StorageWindow;

use crate::SharedFlash;

/// Where the RW firmware pieces live in the flash directory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LayoutNames<'a> {
    pub vblock_a: &'a str,
    pub vblock_b: &'a str,
    pub fw_main_a: &'a str,
    pub fw_main_b: &'a str,
}

impl Default for LayoutNames<'static> {
    fn default() -> Self {
        Self {
            vblock_a: "RW_FWA/VBLOCK",
            vblock_b: "RW_FWB/VBLOCK",
            fw_main_a: "RW_FWA/FW_MAIN",
            fw_main_b: "RW_FWB/FW_MAIN",
        }
    }
}

/// Resolved RW firmware regions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FirmwareLayout {
    pub vblock_a: Region,
    pub vblock_b: Region,
    pub fw_main_a: Region,
    pub fw_main_b: Region,
}

impl FirmwareLayout {
    pub fn from_dcdir(
        flash: &SharedFlash,
        anchor_offset: u32,
        names: &LayoutNames<'_>,
    ) -> DcDirResult<Self> {
        let mut flash = flash.clone();
        let root = DcDir::open_root(&mut flash, anchor_offset)?;
        let layout = Self {
            vblock_a: root.open_region_path(&mut flash, names.vblock_a)?,
            vblock_b: root.open_region_path(&mut flash, names.vblock_b)?,
            fw_main_a: root.open_region_path(&mut flash, names.fw_main_a)?,
            fw_main_b: root.open_region_path(&mut flash, names.fw_main_b)?,
        };
        info!("{layout:x?}");
        Ok(layout)
    }
}

/// A region of the firmware flash as storage of its own.
pub fn window(flash: &SharedFlash, region: Region) -> StorageWindow<SharedFlash> {
    StorageWindow::new(flash.clone(), region.offset, region.size)
}
