use crate::page::Page;
use common::ids::{ContainerId, PageId};
use common::{QuarryError, PAGE_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::RwLock;

/// A page-granular file. Used for heap files and index files alike; the
/// interpretation of the page bytes belongs to the caller.
pub struct HeapFile {
    file: RwLock<File>,
    pub container_id: ContainerId,
    pub file_path: PathBuf,
    /// Number of page reads served from disk. Used by buffer pool tests.
    pub read_count: AtomicU16,
    /// Number of page writes issued to disk.
    pub write_count: AtomicU16,
}

impl HeapFile {
    /// Create or open the file backing a container.
    pub fn new(file_path: PathBuf, container_id: ContainerId) -> Result<Self, QuarryError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&file_path)
            .map_err(|e| {
                QuarryError::IOError(format!(
                    "Cannot open or create heap file {:?}: {}",
                    file_path, e
                ))
            })?;
        Ok(HeapFile {
            file: RwLock::new(file),
            container_id,
            file_path,
            read_count: AtomicU16::new(0),
            write_count: AtomicU16::new(0),
        })
    }

    /// Number of whole pages currently in the file.
    pub fn num_pages(&self) -> PageId {
        let file = self.file.read().unwrap();
        let file_len = file.metadata().map(|m| m.len()).unwrap_or(0);
        (file_len as usize / PAGE_SIZE) as PageId
    }

    /// Write a page at its offset, extending the file when the page is new.
    pub fn write_page_to_file(&self, page: &Page) -> Result<(), QuarryError> {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        let mut file = self.file.write().unwrap();
        let offset = page.get_page_id() as usize * PAGE_SIZE;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(&page.to_bytes())?;
        Ok(())
    }

    /// Read the page at the given id.
    pub fn read_page_from_file(&self, pid: PageId) -> Result<Page, QuarryError> {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        let mut file = self.file.write().unwrap();
        let offset = pid as usize * PAGE_SIZE;
        file.seek(SeekFrom::Start(offset as u64))?;
        let mut buffer = [0u8; PAGE_SIZE];
        file.read_exact(&mut buffer)?;
        Ok(Page::from_bytes(&buffer))
    }

    /// Flush OS buffers for the file.
    pub fn sync(&self) -> Result<(), QuarryError> {
        let file = self.file.write().unwrap();
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::testutil::*;
    use temp_testdir::TempDir;

    #[test]
    fn hs_hf_insert() {
        init();
        let f = gen_random_dir();
        let tdir = TempDir::new(f, true);
        let mut f = tdir.to_path_buf();
        f.push(gen_rand_string(4));
        f.set_extension("hf");
        let hf = HeapFile::new(f.to_path_buf(), 1).unwrap();

        let mut p0 = Page::new(0);
        p0.add_value(&get_random_byte_vec(100));
        p0.add_value(&get_random_byte_vec(100));
        let p0_bytes = p0.to_bytes();
        hf.write_page_to_file(&p0).unwrap();
        assert_eq!(1, hf.num_pages());
        let checkp0 = hf.read_page_from_file(0).unwrap();
        assert_eq!(p0_bytes[..], checkp0.to_bytes()[..]);

        let mut p1 = Page::new(1);
        p1.add_value(&get_random_byte_vec(100));
        let p1_bytes = p1.to_bytes();
        hf.write_page_to_file(&p1).unwrap();
        assert_eq!(2, hf.num_pages());

        let checkp0 = hf.read_page_from_file(0).unwrap();
        assert_eq!(p0_bytes[..], checkp0.to_bytes()[..]);
        let checkp1 = hf.read_page_from_file(1).unwrap();
        assert_eq!(p1_bytes[..], checkp1.to_bytes()[..]);

        assert_eq!(3, hf.read_count.load(Ordering::Relaxed));
        assert_eq!(2, hf.write_count.load(Ordering::Relaxed));
    }
}
