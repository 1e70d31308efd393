//! Type-safe handles for resource management
//!
//! Handles give native code an opaque value to hold instead of a pointer.
//! They use generational indices so a released handle can never resolve
//! again, even after its slot is recycled.

use core::marker::PhantomData;
use core::hash::{Hash, Hasher};
use core::fmt;
use alloc::vec::Vec;

use crate::error::HandleError;

/// A type-safe handle to a resource of type T
///
/// The raw value is never zero for a live handle, so `0` can travel across
/// an FFI boundary as "no handle".
#[repr(transparent)]
pub struct Handle<T> {
    /// Lower 32 bits: index, Upper 32 bits: generation (starts at 1)
    bits: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// First generation handed out for a fresh slot
    pub const FIRST_GENERATION: u32 = 1;

    /// Create a new handle from index and generation
    #[inline]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self {
            bits: (generation as u64) << 32 | index as u64,
            _marker: PhantomData,
        }
    }

    /// Create an invalid/null handle
    #[inline]
    pub const fn null() -> Self {
        Self {
            bits: 0,
            _marker: PhantomData,
        }
    }

    /// Check if this handle is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.generation() == 0
    }

    /// Get the index portion
    #[inline]
    pub const fn index(&self) -> u32 {
        self.bits as u32
    }

    /// Get the generation portion
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.bits >> 32) as u32
    }

    /// Convert to raw bits for FFI transfer
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.bits
    }

    /// Create from raw bits
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            bits,
            _marker: PhantomData,
        }
    }
}

// Manual trait implementations to avoid T bounds
impl<T> Clone for Handle<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle<{}>(null)", core::any::type_name::<T>())
        } else {
            write!(f, "Handle<{}>({}v{})",
                core::any::type_name::<T>(),
                self.index(),
                self.generation()
            )
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

/// Allocates handles with proper generation tracking
///
/// A slot whose generation would wrap is retired instead of recycled, so a
/// raw handle value is never handed out twice.
pub struct HandleAllocator<T> {
    /// Current generation for each slot; 0 marks a retired slot
    generations: Vec<u32>,
    /// Whether each slot is currently allocated
    live: Vec<bool>,
    /// Free list of available indices
    free_list: Vec<u32>,
    /// Number of live handles
    live_count: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HandleAllocator<T> {
    /// Create a new handle allocator with initial capacity
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    /// Create with specific initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            generations: Vec::with_capacity(capacity),
            live: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            live_count: 0,
            _marker: PhantomData,
        }
    }

    /// Allocate a new handle
    pub fn allocate(&mut self) -> Handle<T> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                let index = self.generations.len() as u32;
                assert!(index < u32::MAX, "Handle allocator exhausted");
                self.generations.push(Handle::<T>::FIRST_GENERATION);
                self.live.push(false);
                index
            }
        };

        self.live[index as usize] = true;
        self.live_count += 1;
        Handle::new(index, self.generations[index as usize])
    }

    /// Free a handle, making its index available for reuse
    pub fn free(&mut self, handle: Handle<T>) -> Result<(), HandleError> {
        self.check(handle)?;

        let index = handle.index() as usize;
        self.live[index] = false;
        self.live_count -= 1;

        match self.generations[index].checked_add(1) {
            Some(next) => {
                self.generations[index] = next;
                self.free_list.push(handle.index());
            }
            // Retire the slot rather than wrap back to a used generation
            None => self.generations[index] = 0,
        }
        Ok(())
    }

    /// Check a handle, reporting why it is not usable
    pub fn check(&self, handle: Handle<T>) -> Result<(), HandleError> {
        if handle.is_null() {
            return Err(HandleError::Null);
        }
        let index = handle.index() as usize;
        if index >= self.generations.len() {
            return Err(HandleError::OutOfBounds);
        }
        if !self.live[index] || self.generations[index] != handle.generation() {
            return Err(HandleError::Stale);
        }
        Ok(())
    }

    /// Check if a handle is still valid
    pub fn is_valid(&self, handle: Handle<T>) -> bool {
        self.check(handle).is_ok()
    }

    /// Get the number of allocated handles
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Check if no handles are allocated
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Get the total capacity (including freed slots)
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }
}

impl<T> Default for HandleAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle map that stores values associated with handles
pub struct HandleMap<T> {
    allocator: HandleAllocator<T>,
    values: Vec<Option<T>>,
}

impl<T> HandleMap<T> {
    /// Create a new handle map
    pub fn new() -> Self {
        Self {
            allocator: HandleAllocator::new(),
            values: Vec::new(),
        }
    }

    /// Insert a value and get a handle to it
    pub fn insert(&mut self, value: T) -> Handle<T> {
        let handle = self.allocator.allocate();
        let index = handle.index() as usize;

        if index >= self.values.len() {
            self.values.resize_with(index + 1, || None);
        }
        self.values[index] = Some(value);
        handle
    }

    /// Remove a value by its handle
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T, HandleError> {
        self.allocator.free(handle)?;
        self.values[handle.index() as usize]
            .take()
            .ok_or(HandleError::Stale)
    }

    /// Get a reference to a value by its handle
    pub fn get(&self, handle: Handle<T>) -> Result<&T, HandleError> {
        self.allocator.check(handle)?;
        self.values
            .get(handle.index() as usize)
            .and_then(Option::as_ref)
            .ok_or(HandleError::Stale)
    }

    /// Get a mutable reference to a value by its handle
    pub fn get_mut(&mut self, handle: Handle<T>) -> Result<&mut T, HandleError> {
        self.allocator.check(handle)?;
        self.values
            .get_mut(handle.index() as usize)
            .and_then(Option::as_mut)
            .ok_or(HandleError::Stale)
    }

    /// Check if a handle is valid
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.allocator.is_valid(handle)
    }

    /// Get the number of values
    pub fn len(&self) -> usize {
        self.allocator.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.allocator.is_empty()
    }

    /// Iterate over all valid handles and values
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.values
            .iter()
            .enumerate()
            .filter_map(move |(i, opt)| {
                opt.as_ref().map(|v| {
                    let gen = self.allocator.generations[i];
                    (Handle::new(i as u32, gen), v)
                })
            })
    }

    /// Free every handle and return the values in slot order
    pub fn drain(&mut self) -> Vec<T> {
        let handles: Vec<Handle<T>> = self.iter().map(|(h, _)| h).collect();
        handles
            .into_iter()
            .filter_map(|h| self.remove(h).ok())
            .collect()
    }
}

impl<T> Default for HandleMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
