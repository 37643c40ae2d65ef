//! Engine-owned result handles.
//!
//! Every computation returns one of four handle variants. Their fields are
//! extracted with take-once operations: the first take moves the data out,
//! later takes yield `None`. Releasing a handle discards whatever is still
//! present and is idempotent.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

/// A single-shot container.
///
/// # Examples
///
/// ```
/// use pskit_bridge::core::TakeOnce;
///
/// let mut cell = TakeOnce::new(vec![1u8, 2, 3]);
/// assert_eq!(cell.take(), Some(vec![1, 2, 3]));
/// assert_eq!(cell.take(), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TakeOnce<T> {
    slot: Option<T>,
}

impl<T> TakeOnce<T> {
    /// Creates a cell holding `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self { slot: Some(value) }
    }

    /// Moves the value out. Returns `None` once taken.
    pub const fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    /// Returns `true` while the value has not been taken.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.slot.is_some()
    }

    /// Borrows the value without taking it.
    #[must_use]
    pub const fn peek(&self) -> Option<&T> {
        self.slot.as_ref()
    }

    /// Drops the value if still present.
    pub fn discard(&mut self) {
        self.slot = None;
    }
}

/// Explicit release of engine-owned memory.
///
/// `free` must be idempotent: calling it on a freed or fully-taken handle
/// is a no-op.
pub trait Release {
    /// Discards all remaining data and marks the handle freed.
    fn free(&mut self);

    /// Returns `true` once [`Release::free`] has run.
    fn is_freed(&self) -> bool;
}

impl<H: Release + ?Sized> Release for &mut H {
    fn free(&mut self) {
        (**self).free();
    }

    fn is_freed(&self) -> bool {
        (**self).is_freed()
    }
}

/// Output of the splitting functions: byte buffers keyed by name.
///
/// Keys are enumerated in sorted order. Taking a key removes it, so
/// [`Chunks::keys`] and [`Chunks::len`] only reflect untaken entries.
#[derive(Debug, Default)]
pub struct Chunks {
    parts: BTreeMap<String, Vec<u8>>,
    freed: bool,
}

impl Chunks {
    /// Creates a handle over the given parts.
    #[must_use]
    pub const fn new(parts: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            parts,
            freed: false,
        }
    }

    /// Lists the keys still present.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.parts.keys().cloned().collect()
    }

    /// Number of untaken entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if no entries remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Moves the buffer for `key` out of the handle.
    ///
    /// Returns `None` for unknown, already-taken or freed keys.
    pub fn take(&mut self, key: &str) -> Option<Vec<u8>> {
        self.parts.remove(key)
    }

    /// Takes every remaining entry in key order.
    pub fn take_all(&mut self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut self.parts).into_iter().collect()
    }
}

impl Release for Chunks {
    fn free(&mut self) {
        self.parts.clear();
        self.freed = true;
    }

    fn is_freed(&self) -> bool {
        self.freed
    }
}

/// Output of fragment extraction.
///
/// `start` and `end` are inclusive residue numbers of the extracted range.
#[derive(Debug)]
pub struct Fragment {
    bytes: TakeOnce<Vec<u8>>,
    start: i64,
    end: i64,
    freed: bool,
}

impl Fragment {
    /// Creates a fragment handle.
    #[must_use]
    pub const fn new(bytes: Vec<u8>, start: i64, end: i64) -> Self {
        Self {
            bytes: TakeOnce::new(bytes),
            start,
            end,
            freed: false,
        }
    }

    /// Moves the fragment file out.
    pub const fn take_bytes(&mut self) -> Option<Vec<u8>> {
        self.bytes.take()
    }

    /// First residue number included.
    #[must_use]
    pub const fn start(&self) -> i64 {
        self.start
    }

    /// Last residue number included.
    #[must_use]
    pub const fn end(&self) -> i64 {
        self.end
    }
}

impl Release for Fragment {
    fn free(&mut self) {
        self.bytes.discard();
        self.freed = true;
    }

    fn is_freed(&self) -> bool {
        self.freed
    }
}

/// Protein/nucleic residue pairs in contact, with their minimum distances.
///
/// `pairs` and `distances` are index-aligned.
#[derive(Debug)]
pub struct BindingPairs {
    pairs: TakeOnce<Vec<String>>,
    distances: TakeOnce<Vec<f64>>,
    freed: bool,
}

impl BindingPairs {
    /// Creates the handle from `(pair id, distance)` tuples.
    #[must_use]
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        let (pairs, distances): (Vec<String>, Vec<f64>) = entries.into_iter().unzip();
        Self {
            pairs: TakeOnce::new(pairs),
            distances: TakeOnce::new(distances),
            freed: false,
        }
    }

    /// Moves the pair identifiers out.
    pub const fn take_pairs(&mut self) -> Option<Vec<String>> {
        self.pairs.take()
    }

    /// Moves the distances out.
    pub const fn take_distances(&mut self) -> Option<Vec<f64>> {
        self.distances.take()
    }
}

impl Release for BindingPairs {
    fn free(&mut self) {
        self.pairs.discard();
        self.distances.discard();
        self.freed = true;
    }

    fn is_freed(&self) -> bool {
        self.freed
    }
}

/// Square residue distance matrix, flattened row-major.
#[derive(Debug)]
pub struct ContactMap {
    axis: TakeOnce<Vec<String>>,
    values: TakeOnce<Vec<f64>>,
    side: usize,
    freed: bool,
}

impl ContactMap {
    /// Creates the handle. `values` must hold `axis.len()²` entries.
    #[must_use]
    pub fn new(axis: Vec<String>, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), axis.len() * axis.len());
        Self {
            side: axis.len(),
            axis: TakeOnce::new(axis),
            values: TakeOnce::new(values),
            freed: false,
        }
    }

    /// Matrix side length.
    #[must_use]
    pub const fn side(&self) -> usize {
        self.side
    }

    /// Moves the residue labels out.
    pub const fn take_axis(&mut self) -> Option<Vec<String>> {
        self.axis.take()
    }

    /// Moves the flattened matrix out.
    pub const fn take_values(&mut self) -> Option<Vec<f64>> {
        self.values.take()
    }
}

impl Release for ContactMap {
    fn free(&mut self) {
        self.axis.discard();
        self.values.discard();
        self.freed = true;
    }

    fn is_freed(&self) -> bool {
        self.freed
    }
}

/// Discriminant of a [`ResourceHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// [`Chunks`].
    Chunks,
    /// [`Fragment`].
    Fragment,
    /// [`BindingPairs`].
    BindingPairs,
    /// [`ContactMap`].
    ContactMap,
}

impl HandleKind {
    /// Wire tag of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chunks => "chunks",
            Self::Fragment => "fragment",
            Self::BindingPairs => "binding_pairs",
            Self::ContactMap => "contact_map",
        }
    }
}

/// Any handle an engine entry point can return.
#[derive(Debug)]
pub enum ResourceHandle {
    /// Keyed byte buffers.
    Chunks(Chunks),
    /// Extracted residue range.
    Fragment(Fragment),
    /// Interface contacts.
    BindingPairs(BindingPairs),
    /// Distance matrix.
    ContactMap(ContactMap),
}

impl ResourceHandle {
    /// Returns the handle's kind.
    #[must_use]
    pub const fn kind(&self) -> HandleKind {
        match self {
            Self::Chunks(_) => HandleKind::Chunks,
            Self::Fragment(_) => HandleKind::Fragment,
            Self::BindingPairs(_) => HandleKind::BindingPairs,
            Self::ContactMap(_) => HandleKind::ContactMap,
        }
    }
}

impl Release for ResourceHandle {
    fn free(&mut self) {
        match self {
            Self::Chunks(h) => h.free(),
            Self::Fragment(h) => h.free(),
            Self::BindingPairs(h) => h.free(),
            Self::ContactMap(h) => h.free(),
        }
    }

    fn is_freed(&self) -> bool {
        match self {
            Self::Chunks(h) => h.is_freed(),
            Self::Fragment(h) => h.is_freed(),
            Self::BindingPairs(h) => h.is_freed(),
            Self::ContactMap(h) => h.is_freed(),
        }
    }
}

/// Scope guard that frees its handle when dropped.
///
/// Dropping happens on every exit path, including early returns and
/// unwinding, so a handle held in a guard cannot leak.
///
/// # Examples
///
/// ```
/// use pskit_bridge::core::{Fragment, HandleGuard, Release};
///
/// let mut guard = HandleGuard::new(Fragment::new(b"ATOM".to_vec(), 1, 4));
/// assert!(guard.take_bytes().is_some());
/// let fragment = guard.into_released();
/// assert!(fragment.is_freed());
/// ```
#[derive(Debug)]
pub struct HandleGuard<H: Release> {
    handle: Option<H>,
}

impl<H: Release> HandleGuard<H> {
    /// Wraps a handle.
    #[must_use]
    pub const fn new(handle: H) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Frees the handle now and returns it for inspection.
    #[must_use]
    pub fn into_released(mut self) -> H {
        let mut handle = self.handle.take().unwrap_or_else(|| unreachable_guard());
        handle.free();
        handle
    }
}

#[cold]
fn unreachable_guard() -> ! {
    unreachable!("handle guard emptied before drop")
}

impl<H: Release> Deref for HandleGuard<H> {
    type Target = H;

    fn deref(&self) -> &H {
        self.handle.as_ref().unwrap_or_else(|| unreachable_guard())
    }
}

impl<H: Release> DerefMut for HandleGuard<H> {
    fn deref_mut(&mut self) -> &mut H {
        self.handle.as_mut().unwrap_or_else(|| unreachable_guard())
    }
}

impl<H: Release> Drop for HandleGuard<H> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.free();
        }
    }
}
