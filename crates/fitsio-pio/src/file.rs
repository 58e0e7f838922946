//! FITS containers: a reader built by scanning storage and a writer built
//! from a schema.
//!
//! Each container owns its storage, its HDU directory and its event loop.
//! HDUs are addressed by position; index 0 is the primary HDU.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::element::Element;
use crate::error::{Error, Result};
use crate::hdu::{plan_layout, Hdu, HduSchema};
use crate::header::{format_card, format_end_card, read_header};
use crate::image::{dispatch, HduVisitor, ImageHdu};
use crate::io::RandomAccess;
use crate::reactor::{Completion, Direction, Reactor, Scope};
use crate::value::{FromValue, Value};

/// State shared by readers and writers.
#[derive(Debug)]
struct Container<S> {
    storage: S,
    hdus: Vec<Hdu>,
    reactor: Reactor,
    writable: bool,
}

impl<S: RandomAccess> Container<S> {
    fn hdu(&self, index: usize) -> Result<&Hdu> {
        self.hdus.get(index).ok_or(Error::HduNotFound {
            index,
            count: self.hdus.len(),
        })
    }

    fn read(&self, hdu: usize, index: &[u64], buf: &mut [u8]) -> Result<usize> {
        let offset = self.hdu(hdu)?.transfer_offset(index, buf.len())?;
        self.storage.read_exact_at(buf, offset)?;
        Ok(buf.len())
    }

    fn write(&mut self, hdu: usize, index: &[u64], buf: &[u8]) -> Result<usize> {
        let offset = self.hdu(hdu)?.transfer_offset(index, buf.len())?;
        self.storage.write_all_at(buf, offset)?;
        Ok(buf.len())
    }

    fn submit<H>(
        &mut self,
        hdu: usize,
        index: &[u64],
        direction: Direction,
        buffer: Vec<u8>,
        handler: H,
    ) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, Completion) + 'static,
    {
        self.reactor
            .submit(&self.hdus, hdu, index, direction, buffer, Box::new(handler))
    }

    fn image<T: Element>(&mut self, hdu: usize) -> Result<ImageHdu<'_, T, S>> {
        ImageHdu::new(
            &mut self.storage,
            &self.hdus,
            &mut self.reactor,
            hdu,
            self.writable,
        )
    }

    fn apply<V: HduVisitor>(&mut self, hdu: usize, visitor: V) -> Result<V::Output> {
        dispatch(
            &mut self.storage,
            &self.hdus,
            &mut self.reactor,
            hdu,
            self.writable,
            visitor,
        )
    }

    fn run(&mut self) -> usize {
        self.reactor
            .run(&mut self.storage, &self.hdus, self.writable)
    }

    fn run_one(&mut self) -> bool {
        self.reactor
            .run_one(&mut self.storage, &self.hdus, self.writable)
    }
}

/// A FITS file opened for reading.
///
/// The HDU directory is discovered when the reader is built; array payloads
/// are only touched by explicit reads.
#[derive(Debug)]
pub struct FitsReader<S = File> {
    inner: Container<S>,
}

impl FitsReader<File> {
    /// Open an existing FITS file read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!("opened {}", path.as_ref().display());
        Self::from_storage(file)
    }
}

impl<S: RandomAccess> FitsReader<S> {
    /// Scan `storage` from the first byte and build the HDU directory.
    ///
    /// Empty storage, a header without `END`, or a header lacking `NAXIS`,
    /// `NAXISn` or a valid `BITPIX` fail the whole scan.
    pub fn from_storage(storage: S) -> Result<Self> {
        let size = storage.size()?;
        if size == 0 {
            return Err(Error::UnexpectedEof);
        }

        let mut hdus = Vec::new();
        let mut offset = 0u64;
        while offset < size {
            let scan = read_header(&storage, offset)?;
            let hdu = Hdu::from_scan(scan, offset)?;
            debug!(
                "HDU {}: BITPIX {} axes {:?} header at {} data at {} ({} bytes)",
                hdus.len(),
                hdu.kind().bitpix(),
                hdu.axes(),
                hdu.header_start(),
                hdu.data_start(),
                hdu.data_block_size()
            );
            offset = hdu.end();
            hdus.push(hdu);
        }

        Ok(FitsReader {
            inner: Container {
                storage,
                hdus,
                reactor: Reactor::new(),
                writable: false,
            },
        })
    }

    /// Number of HDUs in the file.
    pub fn len(&self) -> usize {
        self.inner.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.hdus.is_empty()
    }

    /// The HDU at `index`, or [`Error::HduNotFound`].
    pub fn hdu(&self, index: usize) -> Result<&Hdu> {
        self.inner.hdu(index)
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.inner.hdus
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hdu> {
        self.inner.hdus.iter()
    }

    /// Converts the value of `keyword` in HDU `hdu` to `T`.
    pub fn value_as<T: FromValue>(&self, hdu: usize, keyword: &str) -> Result<T> {
        self.hdu(hdu)?.value_as(keyword)
    }

    pub fn value_as_optional<T: FromValue>(&self, hdu: usize, keyword: &str) -> Result<Option<T>> {
        self.hdu(hdu)?.value_as_optional(keyword)
    }

    /// Every value recorded under `keyword` in HDU `hdu`.
    pub fn values<'a>(&'a self, hdu: usize, keyword: &str) -> Result<impl Iterator<Item = &'a str> + 'a> {
        Ok(self.hdu(hdu)?.values(keyword))
    }

    /// Read `buf.len()` bytes at `index` of HDU `hdu`, verbatim.
    pub fn read(&self, hdu: usize, index: &[u64], buf: &mut [u8]) -> Result<usize> {
        self.inner.read(hdu, index, buf)
    }

    /// Queue a read of `buffer.len()` bytes at `index`. Runs on the next pump.
    pub fn read_async<H>(&mut self, hdu: usize, index: &[u64], buffer: Vec<u8>, handler: H) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, Completion) + 'static,
    {
        self.inner.submit(hdu, index, Direction::Read, buffer, handler)
    }

    /// Typed, read-only view of HDU `hdu`.
    pub fn image<T: Element>(&mut self, hdu: usize) -> Result<ImageHdu<'_, T, S>> {
        self.inner.image(hdu)
    }

    /// Run `visitor` against HDU `hdu` with its element type.
    pub fn apply<V: HduVisitor>(&mut self, hdu: usize, visitor: V) -> Result<V::Output> {
        self.inner.apply(hdu, visitor)
    }

    /// Read the whole array of HDU `hdu`, shaped by its axes.
    #[cfg(feature = "array")]
    pub fn read_array<T: Element>(&mut self, hdu: usize) -> Result<ndarray::ArrayD<T>> {
        let image = self.inner.image::<T>(hdu)?;
        let shape = image
            .axes()
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                usize::try_from(size).map_err(|_| Error::InvalidAxis { axis: i + 1, size })
            })
            .collect::<Result<Vec<usize>>>()?;
        let data = image.read_all()?;
        Ok(ndarray::ArrayD::from_shape_vec(shape, data)?)
    }

    /// Execute queued operations until none remain or the loop is stopped.
    pub fn run(&mut self) -> usize {
        self.inner.run()
    }

    pub fn run_one(&mut self) -> bool {
        self.inner.run_one()
    }

    /// Abandon queued operations; their handlers never run.
    pub fn stop(&mut self) {
        self.inner.reactor.stop();
    }

    pub fn restart(&mut self) {
        self.inner.reactor.restart();
    }

    pub fn pending(&self) -> usize {
        self.inner.reactor.pending()
    }

    pub fn into_inner(self) -> S {
        self.inner.storage
    }
}

impl<'a, S> IntoIterator for &'a FitsReader<S> {
    type Item = &'a Hdu;
    type IntoIter = std::slice::Iter<'a, Hdu>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.hdus.iter()
    }
}

/// Builder for a new FITS file on disk.
#[derive(Debug, Clone)]
pub struct NewFitsWriter {
    path: PathBuf,
    overwrite: bool,
}

impl NewFitsWriter {
    /// Replace the file if it already exists.
    pub fn overwrite(mut self) -> Self {
        self.overwrite = true;
        self
    }

    /// Create the file and lay out every HDU in `schemas`.
    pub fn open(self, schemas: &[HduSchema]) -> Result<FitsWriter<File>> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if self.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(&self.path).map_err(|e| match e.kind() {
            IoErrorKind::AlreadyExists => Error::AlreadyExists(self.path.clone()),
            _ => Error::Io(e),
        })?;
        debug!("created {}", self.path.display());
        FitsWriter::with_storage(file, schemas)
    }
}

/// A FITS file being authored.
///
/// Every HDU is laid out when the writer is built: headers are written in
/// full and the storage is extended so each array region exists, zero-filled.
/// Records appended later go into the reserved header blocks.
#[derive(Debug)]
pub struct FitsWriter<S = File> {
    inner: Container<S>,
}

impl FitsWriter<File> {
    /// Start building a new file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> NewFitsWriter {
        NewFitsWriter {
            path: path.as_ref().to_path_buf(),
            overwrite: false,
        }
    }
}

impl<S: RandomAccess> FitsWriter<S> {
    /// Lay out `schemas` in `storage`, discarding anything it held before.
    pub fn with_storage(mut storage: S, schemas: &[HduSchema]) -> Result<Self> {
        let (planned, total) = plan_layout(schemas)?;

        storage.set_size(0)?;
        storage.set_size(total)?;
        let mut hdus = Vec::with_capacity(planned.len());
        for (i, p) in planned.into_iter().enumerate() {
            storage.write_all_at(&p.header, p.hdu.header_start())?;
            debug!(
                "materialized HDU {}: BITPIX {} axes {:?} data at {} ({} bytes)",
                i,
                p.hdu.kind().bitpix(),
                p.hdu.axes(),
                p.hdu.data_start(),
                p.hdu.data_block_size()
            );
            hdus.push(p.hdu);
        }

        Ok(FitsWriter {
            inner: Container {
                storage,
                hdus,
                reactor: Reactor::new(),
                writable: true,
            },
        })
    }

    pub fn len(&self) -> usize {
        self.inner.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.hdus.is_empty()
    }

    pub fn hdu(&self, index: usize) -> Result<&Hdu> {
        self.inner.hdu(index)
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.inner.hdus
    }

    /// Append a record to the header of HDU `hdu`.
    ///
    /// The card takes the place of `END`, which moves one slot down. Fails
    /// with [`Error::HeaderFull`], writing nothing, when the reserved header
    /// blocks have no room for both.
    pub fn write_value(&mut self, hdu: usize, keyword: &str, value: impl Into<Value>) -> Result<()> {
        let count = self.inner.hdus.len();
        let target = self
            .inner
            .hdus
            .get_mut(hdu)
            .ok_or(Error::HduNotFound { index: hdu, count })?;
        let card = format_card(keyword, &value.into())?;
        let offset = target.next_card_offset()?;

        let mut cards = Vec::with_capacity(2 * card.len());
        cards.extend_from_slice(&card);
        cards.extend_from_slice(&format_end_card());
        self.inner.storage.write_all_at(&cards, offset)?;
        target.card_appended(&card)?;
        trace!("HDU {}: appended {} at offset {}", hdu, keyword, offset);
        Ok(())
    }

    /// Converts the value of `keyword` in HDU `hdu` to `T`.
    pub fn value_as<T: FromValue>(&self, hdu: usize, keyword: &str) -> Result<T> {
        self.hdu(hdu)?.value_as(keyword)
    }

    pub fn value_as_optional<T: FromValue>(&self, hdu: usize, keyword: &str) -> Result<Option<T>> {
        self.hdu(hdu)?.value_as_optional(keyword)
    }

    /// Write `buf` verbatim at `index` of HDU `hdu`.
    pub fn write(&mut self, hdu: usize, index: &[u64], buf: &[u8]) -> Result<usize> {
        self.inner.write(hdu, index, buf)
    }

    pub fn read(&self, hdu: usize, index: &[u64], buf: &mut [u8]) -> Result<usize> {
        self.inner.read(hdu, index, buf)
    }

    /// Queue a write of `buffer` at `index`. Runs on the next pump.
    pub fn write_async<H>(&mut self, hdu: usize, index: &[u64], buffer: Vec<u8>, handler: H) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, Completion) + 'static,
    {
        self.inner.submit(hdu, index, Direction::Write, buffer, handler)
    }

    pub fn read_async<H>(&mut self, hdu: usize, index: &[u64], buffer: Vec<u8>, handler: H) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, Completion) + 'static,
    {
        self.inner.submit(hdu, index, Direction::Read, buffer, handler)
    }

    /// Typed view of HDU `hdu`.
    pub fn image<T: Element>(&mut self, hdu: usize) -> Result<ImageHdu<'_, T, S>> {
        self.inner.image(hdu)
    }

    pub fn apply<V: HduVisitor>(&mut self, hdu: usize, visitor: V) -> Result<V::Output> {
        self.inner.apply(hdu, visitor)
    }

    pub fn run(&mut self) -> usize {
        self.inner.run()
    }

    pub fn run_one(&mut self) -> bool {
        self.inner.run_one()
    }

    pub fn stop(&mut self) {
        self.inner.reactor.stop();
    }

    pub fn restart(&mut self) {
        self.inner.reactor.restart();
    }

    pub fn pending(&self) -> usize {
        self.inner.reactor.pending()
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.inner.storage.flush()?)
    }

    /// Give back the storage. Queued operations are dropped unexecuted.
    pub fn into_inner(self) -> S {
        self.inner.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_SIZE;
    use crate::element::ElementKind;
    use crate::io::MemoryFile;

    fn two_hdus() -> FitsWriter<MemoryFile> {
        FitsWriter::with_storage(
            MemoryFile::new(),
            &[
                HduSchema::new(ElementKind::I16, [20, 30]),
                HduSchema::new(ElementKind::F32, [10, 6, 5]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn writer_materializes_layout() {
        let writer = two_hdus();
        assert_eq!(writer.len(), 2);
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.len() as u64, 4 * BLOCK_SIZE);
        assert_eq!(&bytes[..9], b"SIMPLE  =");
        assert_eq!(&bytes[2 * BLOCK_SIZE as usize..2 * BLOCK_SIZE as usize + 8], b"XTENSION");
        assert!(bytes[BLOCK_SIZE as usize..2 * BLOCK_SIZE as usize].iter().all(|&b| b == 0));
    }

    #[test]
    fn writer_discards_previous_contents() {
        let stale = MemoryFile::from(vec![0xAB; 5 * BLOCK_SIZE as usize]);
        let writer =
            FitsWriter::with_storage(stale, &[HduSchema::new(ElementKind::U8, [10])]).unwrap();
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.len() as u64, 2 * BLOCK_SIZE);
        assert!(bytes[BLOCK_SIZE as usize..].iter().all(|&b| b == 0));
    }

    #[test]
    fn reader_rejects_empty_storage() {
        assert!(matches!(
            FitsReader::from_storage(MemoryFile::new()),
            Err(Error::UnexpectedEof)
        ));
    }

    #[test]
    fn reader_reports_missing_hdu() {
        let reader = FitsReader::from_storage(two_hdus().into_inner()).unwrap();
        assert!(matches!(
            reader.hdu(2),
            Err(Error::HduNotFound { index: 2, count: 2 })
        ));
        assert_eq!(reader.iter().count(), 2);
        assert_eq!((&reader).into_iter().count(), 2);
    }

    #[test]
    fn reader_async_rejects_out_of_range_hdu() {
        let mut reader = FitsReader::from_storage(two_hdus().into_inner()).unwrap();
        let err = reader.read_async(5, &[], vec![0; 2], |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::HduNotFound { .. }));
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn write_value_moves_end() {
        let mut writer = two_hdus();
        writer.write_value(0, "OBSERVER", "Hubble").unwrap();
        let bytes = writer.into_inner().into_inner();
        // SIMPLE, BITPIX, NAXIS, NAXIS1, NAXIS2, EXTEND, then the new card.
        assert_eq!(&bytes[6 * 80..6 * 80 + 8], b"OBSERVER");
        assert_eq!(&bytes[7 * 80..7 * 80 + 8], b"END     ");
        assert_eq!(
            bytes.windows(8).filter(|w| *w == b"END     ").count(),
            2,
            "one terminator per HDU"
        );
    }

    #[test]
    fn write_value_rejects_bad_keyword_without_writing() {
        let mut writer = two_hdus();
        let err = writer.write_value(0, "NOT VALID", 1).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyword(_)));
        assert_eq!(writer.hdu(0).unwrap().headers_written(), 6);
    }

    #[test]
    fn write_value_unknown_hdu() {
        let mut writer = two_hdus();
        assert!(matches!(
            writer.write_value(9, "KEY", 1),
            Err(Error::HduNotFound { index: 9, count: 2 })
        ));
    }
}
