use alloc::rc::Rc;
use alloc::vec::Vec;
use core::convert::Infallible;

use log::{error, info};
use payload_storage::StorageOps;
use payload_vboot::{FirmwareModule, ModuleError};

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const EI_CLASS: usize = 4;
const ELF_CLASS_32: u8 = 1;

/// Turns a compressed module into an ELF image and enters it.
pub trait ModuleLoader {
    /// Decompress `src` into `dst` and return the decompressed length.
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize, ModuleError>;

    /// Jump to the entry point of a checked ELF image. Only returns if
    /// that failed.
    fn enter(&self, elf: &[u8]) -> Result<Infallible, ModuleError>;
}

/// Check the identification bytes of a module's ELF image.
pub fn check_elf_ident(image: &[u8]) -> Result<(), ModuleError> {
    if image.get(..ELF_MAGIC.len()) != Some(&ELF_MAGIC[..]) {
        error!("Bad ELF magic value in module.");
        return Err(ModuleError::BadMagic);
    }
    match image.get(EI_CLASS) {
        Some(&ELF_CLASS_32) => Ok(()),
        Some(&class) => {
            error!("Only loading of 32 bit modules is supported.");
            Err(ModuleError::UnsupportedClass(class))
        }
        None => Err(ModuleError::BadMagic),
    }
}

/// A compressed firmware module stored in a flash region.
pub struct DcModule<S> {
    storage: S,
    loader: Rc<dyn ModuleLoader>,
    /// Room reserved for the decompressed image.
    max_image_size: usize,
}

impl<S: StorageOps> DcModule<S> {
    pub fn new(storage: S, loader: Rc<dyn ModuleLoader>, max_image_size: usize) -> Self {
        Self {
            storage,
            loader,
            max_image_size,
        }
    }
}

fn zeroed(len: usize) -> Result<Vec<u8>, ModuleError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| ModuleError::OutOfMemory(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

impl<S: StorageOps> FirmwareModule for DcModule<S> {
    fn start(&mut self) -> Result<Infallible, ModuleError> {
        let size = self.storage.size()? as usize;
        let mut compressed = zeroed(size)?;
        self.storage.read(&mut compressed, 0)?;

        let mut image = zeroed(self.max_image_size)?;
        let len = self
            .loader
            .decompress(&compressed, &mut image)
            .inspect_err(|_| error!("Error decompressing module."))?;
        drop(compressed);

        let elf = image.get(..len).ok_or(ModuleError::Decompress)?;
        check_elf_ident(elf)?;

        info!("Entering module ({len} bytes).");
        self.loader.enter(elf)
    }
}
