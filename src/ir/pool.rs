// src/ir/pool.rs

//! Content-addressed literal pool.
//!
//! Every read-only aggregate the lowering materialises (binary bytes and
//! descriptors, tuple literals, list cells, boxed floats) lives here. The
//! key is a blake3 hash of the global's type and initialiser, so interning
//! identical content twice hands back the same [`GlobalId`]. A pool belongs
//! to exactly one module.

use std::fmt;

use hashbrown::HashMap;

use super::types::LoweredType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub u32);

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static initialiser of a pool global.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstInit {
    Word(u64),
    Float(f64),
    Bytes(Vec<u8>),
    /// Address of another global with `tag` or-ed into the low bits.
    Address { global: GlobalId, tag: u64 },
    Aggregate(Vec<ConstInit>),
}

impl ConstInit {
    fn hash_into(&self, hasher: &mut blake3::Hasher) {
        match self {
            ConstInit::Word(w) => {
                hasher.update(&[0]);
                hasher.update(&w.to_le_bytes());
            }
            ConstInit::Float(x) => {
                hasher.update(&[1]);
                hasher.update(&x.to_bits().to_le_bytes());
            }
            ConstInit::Bytes(bytes) => {
                hasher.update(&[2]);
                hasher.update(&(bytes.len() as u64).to_le_bytes());
                hasher.update(bytes);
            }
            ConstInit::Address { global, tag } => {
                hasher.update(&[3]);
                hasher.update(&global.0.to_le_bytes());
                hasher.update(&tag.to_le_bytes());
            }
            ConstInit::Aggregate(fields) => {
                hasher.update(&[4]);
                hasher.update(&(fields.len() as u64).to_le_bytes());
                for field in fields {
                    field.hash_into(hasher);
                }
            }
        }
    }
}

impl fmt::Display for ConstInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstInit::Word(w) => write!(f, "{w:#x}"),
            ConstInit::Float(x) => write!(f, "{x:?}"),
            ConstInit::Bytes(bytes) => write!(f, "bytes \"{}\"", bytes.escape_ascii()),
            ConstInit::Address { global, tag: 0 } => write!(f, "&g{}", global.0),
            ConstInit::Address { global, tag } => write!(f, "&g{} | {tag:#x}", global.0),
            ConstInit::Aggregate(fields) => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt::Display::fmt(field, f)?;
                }
                f.write_str("}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: LoweredType,
    pub init: ConstInit,
    /// Byte alignment of the global's storage.
    pub align: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    globals: Vec<Global>,
    index: HashMap<[u8; 32], GlobalId>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the global holding `init` at type `ty`, aligned to
    /// at least `align` bytes. The flag reports whether a new global was
    /// created.
    pub fn intern(&mut self, ty: LoweredType, init: ConstInit, align: u64) -> (GlobalId, bool) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(ty.to_string().as_bytes());
        init.hash_into(&mut hasher);
        let hash = hasher.finalize();
        let key = *hash.as_bytes();

        if let Some(&id) = self.index.get(&key) {
            let global = &mut self.globals[id.index()];
            global.align = global.align.max(align);
            return (id, false);
        }

        let id = GlobalId(self.globals.len() as u32);
        let name = format!("lit.{}", &hash.to_hex()[..16]);
        log::trace!("pool: {name} : {ty}, align {align} = {init}");
        self.globals.push(Global { name, ty, init, align });
        self.index.insert(key, id);
        (id, true)
    }

    pub fn get(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId(i as u32), g))
    }

    pub fn len(&self) -> usize {
        self.globals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_ty(n: u64) -> LoweredType {
        LoweredType::Array(Box::new(LoweredType::Int(8)), n)
    }

    #[test]
    fn identical_content_is_interned_once() {
        let mut pool = ConstantPool::new();
        let (a, created_a) = pool.intern(bytes_ty(5), ConstInit::Bytes(b"hello".to_vec()), 8);
        let (b, created_b) = pool.intern(bytes_ty(5), ConstInit::Bytes(b"hello".to_vec()), 8);
        let (c, _) = pool.intern(bytes_ty(5), ConstInit::Bytes(b"world".to_vec()), 8);
        assert!(created_a && !created_b);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn type_participates_in_the_key() {
        let mut pool = ConstantPool::new();
        let (a, _) = pool.intern(LoweredType::Int(64), ConstInit::Word(7), 8);
        let (b, _) = pool.intern(LoweredType::Int(32), ConstInit::Word(7), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn names_are_short_content_hashes() {
        let mut pool = ConstantPool::new();
        let (id, _) = pool.intern(LoweredType::Int(64), ConstInit::Word(0), 8);
        let name = &pool.get(id).name;
        assert!(name.starts_with("lit."));
        assert_eq!(name.len(), 4 + 16);
    }

    #[test]
    fn reinterning_keeps_the_strictest_alignment() {
        let mut pool = ConstantPool::new();
        let (id, _) = pool.intern(bytes_ty(3), ConstInit::Bytes(b"abc".to_vec()), 4);
        assert_eq!(pool.get(id).align, 4);
        let (again, created) = pool.intern(bytes_ty(3), ConstInit::Bytes(b"abc".to_vec()), 16);
        assert_eq!((again, created), (id, false));
        assert_eq!(pool.get(id).align, 16);
        pool.intern(bytes_ty(3), ConstInit::Bytes(b"abc".to_vec()), 8);
        assert_eq!(pool.get(id).align, 16);
    }
}
