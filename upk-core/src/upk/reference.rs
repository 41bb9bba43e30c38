use serde::Serialize;

/// Signed object reference: zero is null, positive values are `export + 1`, negative values
/// are `-(import + 1)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ObjectRef(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectIndex {
    Null,
    Export(usize),
    Import(usize),
}

impl ObjectRef {
    pub const NULL: ObjectRef = ObjectRef(0);

    pub fn export(index: usize) -> Self {
        Self(index as i32 + 1)
    }

    pub fn import(index: usize) -> Self {
        Self(-(index as i32) - 1)
    }

    pub fn resolve(self) -> ObjectIndex {
        match self.0 {
            0 => ObjectIndex::Null,
            n if n > 0 => ObjectIndex::Export(n as usize - 1),
            n => ObjectIndex::Import(n.unsigned_abs() as usize - 1),
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}
