//! Shadow storage for one address space instance.
//!
//! Shadows are kept per byte. Every byte remembers the lane it belongs to
//! together with the address, width and type of that lane, so a load that
//! lines up with an earlier store gets the stored lane back unchanged, and
//! any other load reassembles its lanes from the bytes it covers.
//!
//! An address is valid exactly when its byte has a shadow. Loads and stores
//! through invalid addresses fail instead of reading a default.
use std::{
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use kshadow_ir::{AddressSpace, ScalarType, Type};

use crate::{domain::Domain, Result, ShadowConfig, ShadowError, ShadowValue};

/// The shadow of one byte.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ByteShadow<D> {
    lane: D,
    /// Address of the first byte of the lane.
    origin: u64,
    /// Size of the lane in bytes.
    width: u32,
    ty: ScalarType,
}

/// What the bytes under one lane hold.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LaneBytes<D> {
    /// The lane stored at exactly this address, width and type.
    Whole(D),
    /// Pieces of other lanes. `None` marks bytes without a shadow.
    Pieces(SmallVec<[Option<D>; 8]>),
    /// No byte has a shadow.
    Missing,
}

/// Offset, width and type of every shadow lane of `ty`.
pub(crate) fn lane_layout(ty: Type) -> impl Iterator<Item = (u64, u32, ScalarType)> {
    let (count, width, lane_ty) = match ty {
        Type::Void => (0, 0, ScalarType::I8),
        Type::Scalar(lane_ty) => (1, lane_ty.size() as u32, lane_ty),
        Type::Vector { elem, lanes } => (lanes, elem.size() as u32, elem),
        Type::Aggregate { size } => (1, size, ScalarType::I8),
    };
    (0..count).map(move |idx| (u64::from(idx) * u64::from(width), width, lane_ty))
}

pub struct ShadowMemory<D: Domain> {
    space: AddressSpace,
    /// Low address bits addressing bytes within a buffer.
    offset_bits: u32,
    bytes: DashMap<u64, ByteShadow<D>, FxBuildHasher>,
    /// Extents handed out by `allocate`, by start address.
    allocations: DashMap<u64, u64, FxBuildHasher>,
    stripes: Box<[Mutex<()>]>,
}

impl<D: Domain> ShadowMemory<D> {
    /// `buffer_bits` high bits of each `address_bits` wide address name the
    /// buffer. `stripes` must be a power of two.
    pub fn new(
        space: AddressSpace,
        address_bits: u32,
        buffer_bits: u32,
        stripes: usize,
    ) -> Result<Self> {
        if buffer_bits == 0 || buffer_bits >= address_bits || address_bits > 64 {
            return Err(ShadowError::InvalidConfig(format!(
                "{space} buffer bits {buffer_bits} out of range for {address_bits}-bit addresses"
            )));
        }
        if !stripes.is_power_of_two() {
            return Err(ShadowError::InvalidConfig(format!(
                "lock stripe count {stripes} is not a power of two"
            )));
        }

        Ok(Self {
            space,
            offset_bits: address_bits - buffer_bits,
            bytes: DashMap::with_hasher(FxBuildHasher),
            allocations: DashMap::with_hasher(FxBuildHasher),
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        })
    }

    pub fn for_space(space: AddressSpace, config: &ShadowConfig) -> Result<Self> {
        let buffer_bits = match space {
            AddressSpace::Private => config.private_buffer_bits,
            AddressSpace::Local => config.local_buffer_bits,
            AddressSpace::Global => config.global_buffer_bits,
            AddressSpace::Constant => return Err(ShadowError::NoShadowStorage(space)),
        };
        Self::new(
            space,
            config.pointer_width.bits(),
            buffer_bits,
            config.lock_stripes,
        )
    }

    pub fn space(&self) -> AddressSpace {
        self.space
    }

    pub fn extract_buffer(&self, address: u64) -> u64 {
        address >> self.offset_bits
    }

    pub fn extract_offset(&self, address: u64) -> u64 {
        address & ((1u64 << self.offset_bits) - 1)
    }

    /// Starts a fresh shadow of `ty` at `address` holding the pessimistic
    /// value. Whatever the extent held before is replaced.
    pub fn allocate(&self, address: u64, ty: Type) {
        self.write(address, ty, &ShadowValue::pessimistic(ty));
        self.allocations.insert(address, ty.size() as u64);
    }

    /// Releases the extent allocated at `address`, or the lane starting there
    /// if nothing was allocated at it.
    pub fn deallocate(&self, address: u64) -> bool {
        let extent = match self.allocations.remove(&address) {
            Some((_, size)) => size,
            None => match self.bytes.get(&address) {
                Some(byte) if byte.origin == address => u64::from(byte.width),
                _ => return false,
            },
        };
        self.release_range(address, extent);
        true
    }

    /// Writes `shadow` as a value of `ty` at `address`, making every byte it
    /// covers valid.
    pub fn insert(&self, address: u64, ty: Type, shadow: ShadowValue<D>) {
        self.write(address, ty, &shadow.normalize(ty));
    }

    pub fn is_valid(&self, address: u64) -> bool {
        self.bytes.contains_key(&address)
    }

    /// Whether every byte of `[start, start + len)` is valid.
    pub fn is_valid_range(&self, start: u64, len: u64) -> bool {
        self.first_invalid(start, len).is_none()
    }

    fn first_invalid(&self, start: u64, len: u64) -> Option<u64> {
        (0..len)
            .map(|offset| start.wrapping_add(offset))
            .find(|address| !self.bytes.contains_key(address))
    }

    fn invalid(&self, address: u64) -> ShadowError {
        ShadowError::InvalidAddress {
            space: self.space,
            address,
        }
    }

    pub fn load(&self, address: u64, ty: Type) -> Result<ShadowValue<D>> {
        let mut lanes = SmallVec::<[D; 4]>::new();
        for (offset, width, lane_ty) in lane_layout(ty) {
            let lane_address = address.wrapping_add(offset);
            if width == 0 {
                lanes.push(D::opaque(lane_ty));
                continue;
            }
            let lane = match self.lane_bytes(lane_address, width, lane_ty) {
                LaneBytes::Whole(lane) => lane,
                LaneBytes::Pieces(pieces) => {
                    let mut parts = SmallVec::<[D; 8]>::with_capacity(pieces.len());
                    for (idx, piece) in pieces.into_iter().enumerate() {
                        parts.push(piece.ok_or_else(|| {
                            self.invalid(lane_address.wrapping_add(idx as u64))
                        })?);
                    }
                    D::from_bytes(&parts, lane_ty)
                }
                LaneBytes::Missing => return Err(self.invalid(lane_address)),
            };
            lanes.push(lane);
        }
        Ok(ShadowValue::from_lanes(lanes))
    }

    /// Replaces the shadow of a `ty` value at `address`. Every byte must be
    /// valid already.
    pub fn store(&self, address: u64, ty: Type, shadow: ShadowValue<D>) -> Result<()> {
        if let Some(address) = self.first_invalid(address, ty.size() as u64) {
            return Err(self.invalid(address));
        }
        self.insert(address, ty, shadow);
        Ok(())
    }

    /// The bytes of the `width` byte lane of type `ty` at `address`.
    pub(crate) fn lane_bytes(&self, address: u64, width: u32, ty: ScalarType) -> LaneBytes<D> {
        let mut pieces = SmallVec::<[Option<D>; 8]>::with_capacity(width as usize);
        let mut whole = width > 0;
        for offset in 0..u64::from(width) {
            let byte = self.bytes.get(&address.wrapping_add(offset)).map(|byte| *byte);
            whole &= byte.is_some_and(|byte| {
                byte.origin == address && byte.width == width && byte.ty == ty
            });
            pieces.push(byte.map(|byte| byte.lane));
        }

        if whole {
            // Racing writers of one lane may leave unequal bytes behind.
            pieces
                .into_iter()
                .flatten()
                .reduce(D::combine)
                .map_or(LaneBytes::Missing, LaneBytes::Whole)
        } else if pieces.iter().all(Option::is_none) {
            LaneBytes::Missing
        } else {
            LaneBytes::Pieces(pieces)
        }
    }

    fn write(&self, address: u64, ty: Type, shadow: &ShadowValue<D>) {
        for (idx, (offset, width, lane_ty)) in lane_layout(ty).enumerate() {
            let origin = address.wrapping_add(offset);
            self.write_lane(origin, width, lane_ty, shadow.lane_or_default(idx, lane_ty));
        }
    }

    fn write_lane(&self, origin: u64, width: u32, ty: ScalarType, lane: D) {
        let byte = ByteShadow {
            lane,
            origin,
            width,
            ty,
        };
        for offset in 0..u64::from(width) {
            self.bytes.insert(origin.wrapping_add(offset), byte);
        }
    }

    fn stripe(&self, address: u64) -> usize {
        ((self.extract_offset(address) >> 2) as usize) & (self.stripes.len() - 1)
    }

    /// Takes the stripe lock covering `address`. Unlocked on drop.
    pub fn lock(&self, address: u64) -> MutexGuard<'_, ()> {
        // The guarded data is `()`, so a poisoned lock carries no broken state.
        self.stripes[self.stripe(address)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn try_lock(&self, address: u64) -> Option<MutexGuard<'_, ()>> {
        match self.stripes[self.stripe(address)].try_lock() {
            Ok(guard) => Some(guard),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(std::sync::TryLockError::WouldBlock) => None,
        }
    }

    /// Copies the byte shadows of `[src, src + len)` in `source` to the same
    /// offsets from `dst`. Destination bytes without a source counterpart are
    /// left alone. Returns the number of bytes copied.
    pub fn copy_from(&self, source: &Self, src: u64, dst: u64, len: u64) -> usize {
        // Read everything first: `source` may be this memory, overlapping.
        let copied: Vec<_> = (0..len)
            .filter_map(|offset| {
                let byte = *source.bytes.get(&src.wrapping_add(offset))?;
                Some((offset, byte))
            })
            .collect();
        for &(offset, byte) in &copied {
            let moved = ByteShadow {
                origin: byte.origin.wrapping_sub(src).wrapping_add(dst),
                ..byte
            };
            self.bytes.insert(dst.wrapping_add(offset), moved);
        }
        copied.len()
    }

    /// Overwrites every byte of `[start, start + len)` with `lane`.
    pub fn fill_range(&self, start: u64, len: u64, lane: D) {
        for offset in 0..len {
            self.write_lane(start.wrapping_add(offset), 1, ScalarType::I8, lane);
        }
    }

    /// Like [`Self::fill_range`], asking `lane` for the shadow of each byte.
    pub fn fill_with(
        &self,
        start: u64,
        len: u64,
        mut lane: impl FnMut(u64) -> Result<D>,
    ) -> Result<()> {
        for offset in 0..len {
            self.write_lane(start.wrapping_add(offset), 1, ScalarType::I8, lane(offset)?);
        }
        Ok(())
    }

    /// Drops the shadow of every byte in `[start, start + len)`.
    pub fn release_range(&self, start: u64, len: u64) -> usize {
        let before = self.bytes.len();
        self.bytes.retain(|address, _| !in_range(*address, start, len));
        self.allocations
            .retain(|address, _| !in_range(*address, start, len));
        before.saturating_sub(self.bytes.len())
    }

    pub fn release_buffer(&self, buffer: u64) -> usize {
        let before = self.bytes.len();
        self.bytes
            .retain(|address, _| self.extract_buffer(*address) != buffer);
        self.allocations
            .retain(|address, _| self.extract_buffer(*address) != buffer);
        before.saturating_sub(self.bytes.len())
    }

    /// Number of bytes with a shadow.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&self) {
        self.bytes.clear();
        self.allocations.clear();
    }
}

impl<D: Domain> fmt::Debug for ShadowMemory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowMemory")
            .field("space", &self.space)
            .field("offset_bits", &self.offset_bits)
            .field("bytes", &self.bytes.len())
            .field("allocations", &self.allocations.len())
            .field("stripes", &self.stripes.len())
            .finish()
    }
}

/// One line per run of bytes holding the same lane.
impl<D: Domain> fmt::Display for ShadowMemory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes: Vec<_> = self
            .bytes
            .iter()
            .map(|byte| (*byte.key(), *byte.value()))
            .collect();
        bytes.sort_unstable_by_key(|(address, _)| *address);

        let mut runs: Vec<(u64, u64, ByteShadow<D>)> = Vec::new();
        for (address, byte) in bytes {
            match runs.last_mut() {
                Some((start, len, last))
                    if *last == byte && start.wrapping_add(*len) == address =>
                {
                    *len += 1;
                }
                _ => runs.push((address, 1, byte)),
            }
        }

        writeln!(f, "{} memory ({} bytes)", self.space, self.bytes.len())?;
        for (start, len, byte) in runs {
            write!(
                f,
                "  {:#x} [buffer {:#x} + {:#x}]: {:?}",
                start,
                self.extract_buffer(start),
                self.extract_offset(start),
                byte.lane
            )?;
            if start != byte.origin || len != u64::from(byte.width) {
                write!(f, " ({len} of {} bytes at {:#x})", byte.width, byte.origin)?;
            } else if len > 1 {
                write!(f, " ({len} bytes)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn in_range(address: u64, start: u64, len: u64) -> bool {
    address >= start && address - start < len
}
