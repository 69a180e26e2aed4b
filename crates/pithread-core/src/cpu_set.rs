//! Dynamically sized processor-affinity sets.
//!
//! A [`CpuSet`] is either *unrestricted* (no bitmap allocated: the thread may
//! run anywhere) or an allocated bitmap sized for the processors online when
//! it was first written. The bitmap uses the kernel `cpu_set_t` layout: bit
//! `i % WORD_BITS` of word `i / WORD_BITS`, words of `unsigned long`.
//!
//! Every index operation validates against [`CpuSet::num_processors`] at
//! call time.

use std::fmt;

use crate::error::{Result, SchedError};
use crate::os;
use crate::thread_config::CoreAffinity;

/// Native word of a kernel cpu mask (`unsigned long` on every Linux target).
pub type CpuMaskWord = usize;

/// Bits per native mask word.
pub const WORD_BITS: usize = CpuMaskWord::BITS as usize;

#[inline]
const fn words_for(bits: usize) -> usize {
    bits.div_ceil(WORD_BITS)
}

/// Set of logical processors a thread may run on.
#[derive(Clone, Default)]
pub struct CpuSet {
    words: Option<Box<[CpuMaskWord]>>,
}

impl CpuSet {
    /// The unrestricted set.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: None }
    }

    /// Build a set from processor indices.
    pub fn from_cpus<I: IntoIterator<Item = usize>>(cpus: I) -> Result<Self> {
        let mut set = Self::new();
        for cpu in cpus {
            set.set(cpu)?;
        }
        Ok(set)
    }

    /// Build a set from an external byte mask.
    ///
    /// Bits beyond this machine's processor count cannot be honored and are
    /// an error rather than being dropped. A narrower mask leaves the
    /// remaining processors unset. A descriptor with `core_count == 0`
    /// denotes "no restriction"; one that addresses cores but selects none
    /// is an error.
    pub fn from_core_affinity(affinity: &CoreAffinity) -> Result<Self> {
        if affinity.core_count() == 0 {
            return Ok(Self::new());
        }
        let num_proc = Self::num_processors();
        let mut set = Self::new();
        set.alloc(num_proc);
        for cpu in 0..affinity.core_count() {
            if !affinity.is_set(cpu) {
                continue;
            }
            if cpu >= num_proc {
                return Err(SchedError::invalid(format!(
                    "invalid cpu number {cpu}: only {num_proc} processors online"
                )));
            }
            set.set_bit(cpu);
        }
        if set.count() == 0 {
            return Err(SchedError::invalid(
                "core affinity addresses cores but selects none",
            ));
        }
        Ok(set)
    }

    /// Replace this set with the contents of `affinity`. On error the set is
    /// left unchanged.
    pub fn set_core_affinity(&mut self, affinity: &CoreAffinity) -> Result<()> {
        *self = Self::from_core_affinity(affinity)?;
        Ok(())
    }

    /// Export to the descriptor shape. The unrestricted set exports as an
    /// empty descriptor.
    #[must_use]
    pub fn to_core_affinity(&self) -> CoreAffinity {
        if self.is_unrestricted() {
            return CoreAffinity::default();
        }
        let mut out = CoreAffinity::new(Self::num_processors().max(self.highest_set_plus_one()));
        for cpu in self.iter() {
            out.set(cpu);
        }
        out
    }

    /// Number of online logical processors, as reported by the OS now.
    ///
    /// May change between calls on systems with hot-pluggable CPUs; callers
    /// needing a stable value should read it once.
    #[must_use]
    pub fn num_processors() -> usize {
        os::online_processors()
    }

    /// Add `cpu` to the set.
    pub fn set(&mut self, cpu: usize) -> Result<()> {
        let num_proc = Self::valid_cpu(cpu)?;
        self.alloc(num_proc);
        self.set_bit(cpu);
        Ok(())
    }

    /// Remove `cpu` from the set.
    pub fn unset(&mut self, cpu: usize) -> Result<()> {
        let num_proc = Self::valid_cpu(cpu)?;
        self.alloc(num_proc);
        if let Some(words) = &mut self.words {
            words[cpu / WORD_BITS] &= !(1 << (cpu % WORD_BITS));
        }
        Ok(())
    }

    /// True if `cpu` is in the set. Always false for the unrestricted set.
    pub fn is_set(&self, cpu: usize) -> Result<bool> {
        Self::valid_cpu(cpu)?;
        Ok(self.bit(cpu))
    }

    /// Zero every bit. An unrestricted set stays unrestricted.
    pub fn clear(&mut self) {
        if let Some(words) = &mut self.words {
            words.fill(0);
        }
    }

    /// Number of processors in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words
            .as_deref()
            .map_or(0, |w| w.iter().map(|x| x.count_ones() as usize).sum())
    }

    /// True if no bitmap has been allocated: no affinity restriction.
    #[must_use]
    pub const fn is_unrestricted(&self) -> bool {
        self.words.is_none()
    }

    /// Iterate over the processors in the set, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let words = self.words.as_deref().unwrap_or(&[]);
        words.iter().enumerate().flat_map(|(wi, &w)| {
            (0..WORD_BITS)
                .filter(move |b| w & (1 << b) != 0)
                .map(move |b| wi * WORD_BITS + b)
        })
    }

    /// Snapshot of the bitmap in kernel layout, sized for the processors
    /// online now (`CPU_ALLOC_SIZE` semantics). The unrestricted set yields
    /// all zeroes.
    #[must_use]
    pub fn native_words(&self) -> Vec<CpuMaskWord> {
        let len = words_for(Self::num_processors()).max(self.words.as_ref().map_or(0, |w| w.len()));
        let mut out = vec![0; len];
        if let Some(words) = &self.words {
            out[..words.len()].copy_from_slice(words);
        }
        out
    }

    /// Byte size of a [`CpuSet::native_words`] snapshot.
    #[must_use]
    pub fn native_size(&self) -> usize {
        self.native_words().len() * std::mem::size_of::<CpuMaskWord>()
    }

    /// Build a set from a kernel-layout bitmap (as filled by
    /// `sched_getaffinity`).
    pub fn from_native_words(native: &[CpuMaskWord]) -> Result<Self> {
        let num_proc = Self::num_processors();
        let mut set = Self::new();
        set.alloc(num_proc);
        for (wi, &w) in native.iter().enumerate() {
            for b in 0..WORD_BITS {
                if w & (1 << b) == 0 {
                    continue;
                }
                let cpu = wi * WORD_BITS + b;
                if cpu >= num_proc {
                    return Err(SchedError::invalid(format!(
                        "invalid cpu number {cpu}: only {num_proc} processors online"
                    )));
                }
                set.set_bit(cpu);
            }
        }
        Ok(set)
    }

    /// Exchange contents with `other` without copying bitmaps.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.words, &mut other.words);
    }

    /// Move the contents out, leaving this set unrestricted.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    fn valid_cpu(cpu: usize) -> Result<usize> {
        let num_proc = Self::num_processors();
        if cpu >= num_proc {
            return Err(SchedError::invalid(format!(
                "invalid cpu number {cpu}: only {num_proc} processors online"
            )));
        }
        Ok(num_proc)
    }

    // Allocate on first write; grow if processors came online since.
    fn alloc(&mut self, num_proc: usize) {
        let need = words_for(num_proc).max(1);
        match &mut self.words {
            Some(words) if words.len() >= need => {}
            Some(words) => {
                let mut grown = vec![0; need];
                grown[..words.len()].copy_from_slice(words);
                *words = grown.into_boxed_slice();
            }
            None => self.words = Some(vec![0; need].into_boxed_slice()),
        }
    }

    fn set_bit(&mut self, cpu: usize) {
        if let Some(words) = &mut self.words {
            words[cpu / WORD_BITS] |= 1 << (cpu % WORD_BITS);
        }
    }

    fn bit(&self, cpu: usize) -> bool {
        self.words
            .as_deref()
            .and_then(|w| w.get(cpu / WORD_BITS))
            .is_some_and(|w| w & (1 << (cpu % WORD_BITS)) != 0)
    }

    fn highest_set_plus_one(&self) -> usize {
        self.iter().last().map_or(0, |c| c + 1)
    }
}

impl PartialEq for CpuSet {
    fn eq(&self, other: &Self) -> bool {
        match (&self.words, &other.words) {
            (None, None) => true,
            (Some(_), Some(_)) => self.iter().eq(other.iter()),
            _ => false,
        }
    }
}

impl Eq for CpuSet {}

impl fmt::Debug for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unrestricted() {
            return f.write_str("CpuSet(unrestricted)");
        }
        f.debug_set().entries(self.iter()).finish()
    }
}
