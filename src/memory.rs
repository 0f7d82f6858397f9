use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadWriteFault {
    #[error("word index ${0:08X} is outside shared memory")]
    OutOfRange(u32),

    #[error("image of {image} words does not fit in {capacity} words")]
    ImageTooLarge { image: usize, capacity: usize },
}

/// Word-indexed storage that execution units fetch from and store to.
pub trait Addressable {
    fn read_u32(&self, index: u32) -> Result<u32, ReadWriteFault>;
    fn write_u32(&mut self, value: u32, index: u32) -> Result<(), ReadWriteFault>;

    // block read/write functions. not every store needs a faster path, so defaults are provided
    fn read_block(&self, index: u32, length: u32) -> Result<Vec<u32>, ReadWriteFault> {
        (0..length).map(|i| self.read_u32(index.wrapping_add(i))).collect()
    }

    fn write_block(&mut self, index: u32, block: &[u32]) -> Result<(), ReadWriteFault> {
        for (i, value) in block.iter().enumerate() {
            self.write_u32(*value, index.wrapping_add(i as u32))?;
        }
        Ok(())
    }
}

/// Flat memory shared by the CPU and RCP units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedMemory {
    mem: Vec<u32>,
}

impl SharedMemory {
    pub fn new(size_words: usize) -> SharedMemory {
        SharedMemory {
            mem: vec![0u32; size_words],
        }
    }

    pub fn from_words(words: Vec<u32>) -> SharedMemory {
        SharedMemory {
            mem: words,
        }
    }

    /// Build a memory of `size_words` words with a big endian image placed at index 0.
    /// A trailing partial word is zero padded.
    pub fn from_be_bytes(image: &[u8], size_words: usize) -> Result<SharedMemory, ReadWriteFault> {
        let image_words = (image.len() + 3) / 4;
        if image_words > size_words {
            return Err(ReadWriteFault::ImageTooLarge { image: image_words, capacity: size_words });
        }

        let mut mem = vec![0u32; size_words];
        for (i, chunk) in image.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            mem[i] = u32::from_be_bytes(word);
        }

        Ok(SharedMemory { mem })
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    pub fn words(&self) -> &[u32] {
        &self.mem
    }
}

impl Addressable for SharedMemory {
    #[inline(always)]
    fn read_u32(&self, index: u32) -> Result<u32, ReadWriteFault> {
        self.mem.get(index as usize).copied().ok_or(ReadWriteFault::OutOfRange(index))
    }

    #[inline(always)]
    fn write_u32(&mut self, value: u32, index: u32) -> Result<(), ReadWriteFault> {
        match self.mem.get_mut(index as usize) {
            Some(word) => {
                *word = value;
                Ok(())
            },
            None => Err(ReadWriteFault::OutOfRange(index)),
        }
    }
}
