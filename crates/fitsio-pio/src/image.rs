//! Typed access to the array of one HDU.
//!
//! [`ImageHdu`] converts between native values and the big-endian bytes in
//! storage. It is obtained either for a known element type through
//! `FitsReader::image` / `FitsWriter::image`, or for whatever type the HDU
//! holds through `apply` and an [`HduVisitor`].

use std::io;
use std::marker::PhantomData;

use crate::element::{decode, encode, Element, ElementKind};
use crate::error::{Error, Result};
use crate::hdu::Hdu;
use crate::io::RandomAccess;
use crate::reactor::{Completion, Direction, Reactor, Scope};

/// A view of one HDU's array as elements of type `T`.
pub struct ImageHdu<'a, T, S: ?Sized> {
    storage: &'a mut S,
    hdus: &'a [Hdu],
    reactor: &'a mut Reactor,
    index: usize,
    writable: bool,
    _element: PhantomData<T>,
}

impl<'a, T: Element, S: RandomAccess + ?Sized> ImageHdu<'a, T, S> {
    /// Fails with [`Error::KindMismatch`] unless HDU `index` holds `T`.
    pub(crate) fn new(
        storage: &'a mut S,
        hdus: &'a [Hdu],
        reactor: &'a mut Reactor,
        index: usize,
        writable: bool,
    ) -> Result<Self> {
        let hdu = hdus.get(index).ok_or(Error::HduNotFound {
            index,
            count: hdus.len(),
        })?;
        if hdu.kind() != T::KIND {
            return Err(Error::KindMismatch {
                expected: T::KIND.bitpix(),
                found: hdu.kind().bitpix(),
            });
        }
        Ok(ImageHdu {
            storage,
            hdus,
            reactor,
            index,
            writable,
            _element: PhantomData,
        })
    }

    pub fn hdu(&self) -> &Hdu {
        &self.hdus[self.index]
    }

    pub fn axes(&self) -> &[u64] {
        self.hdu().axes()
    }

    /// Byte length of `count` elements at `index` and its storage offset,
    /// checked before any buffer is allocated.
    fn locate(&self, index: &[u64], count: usize) -> Result<(usize, u64)> {
        let width = T::KIND.byte_width();
        let len = count
            .checked_mul(width)
            .ok_or(Error::TransferTooLarge { count, width })?;
        let offset = self.hdu().transfer_offset(index, len)?;
        Ok((len, offset))
    }

    /// Read `count` elements starting at `index`.
    pub fn read(&self, index: &[u64], count: usize) -> Result<Vec<T>> {
        let (len, offset) = self.locate(index, count)?;
        let mut raw = vec![0u8; len];
        self.storage.read_exact_at(&mut raw, offset)?;
        Ok(decode(&raw))
    }

    /// Read the whole array.
    pub fn read_all(&self) -> Result<Vec<T>> {
        let count = usize::try_from(self.hdu().element_count()).map_err(|_| {
            Error::OutOfBounds {
                offset: 0,
                len: self.hdu().data_len(),
                extent: self.hdu().data_len(),
            }
        })?;
        self.read(&[], count)
    }

    /// Write `values` starting at `index`. Returns the number of elements written.
    pub fn write(&mut self, index: &[u64], values: &[T]) -> Result<usize> {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        let raw = encode(values);
        let offset = self.hdu().transfer_offset(index, raw.len())?;
        self.storage.write_all_at(&raw, offset)?;
        Ok(values.len())
    }

    /// Queue a read of `count` elements at `index`. The handler receives the
    /// decoded values once the loop runs the transfer.
    pub fn read_async<H>(&mut self, index: &[u64], count: usize, handler: H) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, io::Result<Vec<T>>) + 'static,
    {
        let (len, _) = self.locate(index, count)?;
        let buffer = vec![0u8; len];
        self.reactor.submit(
            self.hdus,
            self.index,
            index,
            Direction::Read,
            buffer,
            Box::new(move |scope: &mut Scope<'_>, completion: Completion| {
                let values = completion.result.map(|_| decode(&completion.buffer));
                handler(scope, values);
            }),
        )
    }

    /// Queue a write of `values` at `index`.
    pub fn write_async<H>(&mut self, index: &[u64], values: &[T], handler: H) -> Result<()>
    where
        H: FnOnce(&mut Scope<'_>, Completion) + 'static,
    {
        if !self.writable {
            return Err(Error::ReadOnly);
        }
        self.reactor.submit(
            self.hdus,
            self.index,
            index,
            Direction::Write,
            encode(values),
            Box::new(handler),
        )
    }
}

/// Operation run against an HDU with its concrete element type.
///
/// ```ignore
/// struct Sum;
///
/// impl HduVisitor for Sum {
///     type Output = Result<f64>;
///
///     fn visit<T: Element, S: RandomAccess + ?Sized>(self, image: ImageHdu<'_, T, S>) -> Self::Output {
///         let values = image.read_all()?;
///         Ok(values.len() as f64)
///     }
/// }
/// ```
pub trait HduVisitor {
    type Output;

    fn visit<T: Element, S: RandomAccess + ?Sized>(self, image: ImageHdu<'_, T, S>) -> Self::Output;
}

/// Call `visitor` with an accessor typed after the element kind of HDU `index`.
pub(crate) fn dispatch<V, S>(
    storage: &mut S,
    hdus: &[Hdu],
    reactor: &mut Reactor,
    index: usize,
    writable: bool,
    visitor: V,
) -> Result<V::Output>
where
    V: HduVisitor,
    S: RandomAccess + ?Sized,
{
    let kind = hdus
        .get(index)
        .ok_or(Error::HduNotFound {
            index,
            count: hdus.len(),
        })?
        .kind();
    macro_rules! visit {
        ($t:ty) => {
            visitor.visit(ImageHdu::<$t, S>::new(
                storage, hdus, reactor, index, writable,
            )?)
        };
    }
    Ok(match kind {
        ElementKind::U8 => visit!(u8),
        ElementKind::I16 => visit!(i16),
        ElementKind::I32 => visit!(i32),
        ElementKind::I64 => visit!(i64),
        ElementKind::F32 => visit!(f32),
        ElementKind::F64 => visit!(f64),
    })
}
