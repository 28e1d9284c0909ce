use super::{Deserialize, Error, Serialize};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::io::{ErrorKind, Result as IoResult};
use std::result::Result;

/// Constant pool of a class
///
/// Pools are either read out of a class file or built up by appending constants (the `get_*`
/// methods re-use an existing matching entry where there is one). On top of the symbolic entries,
/// the pool tracks which `Class` and `String` entries have been resolved, the same way a running
/// VM swaps a symbolic entry for its resolved target. Lookups through [`ConstantPool::class_name`]
/// and [`ConstantPool::string`] see through either representation.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,

    /// Resolved `Class` and `String` entries, keyed by their index
    resolved: HashMap<ConstantIndex, String>,

    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, ConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    member_refs: HashMap<(u8, ClassConstantIndex, NameAndTypeConstantIndex), ConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
}

impl ConstantPool {
    /// Make a fresh empty constants pool (the first usable index is 1)
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            resolved: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            utf8s: HashMap::new(),
            name_and_types: HashMap::new(),
            member_refs: HashMap::new(),
            integers: HashMap::new(),
            floats: HashMap::new(),
            longs: HashMap::new(),
            doubles: HashMap::new(),
        }
    }

    /// Number of entries (long and double entries count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Append a constant without checking for an existing equal entry
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    pub fn push(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let Offset(offset) = self.constants.offset_len();
        if offset + constant.width() > u16::MAX as usize {
            return Err(Error::ConstantPoolOverflow { offset });
        }
        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Get a constant out of the pool
    pub fn get(&self, index: ConstantIndex) -> Option<&Constant> {
        self.constants.get_offset(Offset(index.0 as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(Offset(off), constant)| (ConstantIndex(off as u16), constant))
    }

    /// Get or insert a utf8 constant
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, Error> {
        let cow = utf8.into();
        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            return Ok(*idx);
        }
        let owned = cow.into_owned();
        let idx = Utf8ConstantIndex(self.push(Constant::Utf8(owned.clone()))?);
        self.utf8s.insert(owned, idx);
        Ok(idx)
    }

    /// Get or insert a class constant (`name` is in the internal `java/lang/Object` form)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        if let Some(idx) = self.classes.get(&name) {
            return Ok(*idx);
        }
        let idx = ClassConstantIndex(self.push(Constant::Class(name))?);
        self.classes.insert(name, idx);
        Ok(idx)
    }

    /// Get or insert a string constant
    pub fn get_string(&mut self, string: &str) -> Result<ConstantIndex, Error> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            return Ok(*idx);
        }
        let idx = self.push(Constant::String(utf8))?;
        self.strings.insert(utf8, idx);
        Ok(idx)
    }

    /// Get or insert a name & type constant
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.name_and_types.get(&(name, descriptor)) {
            return Ok(*idx);
        }
        let constant = Constant::NameAndType { name, descriptor };
        let idx = NameAndTypeConstantIndex(self.push(constant)?);
        self.name_and_types.insert((name, descriptor), idx);
        Ok(idx)
    }

    /// Get or insert a field reference
    pub fn get_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.get_member_ref(Constant::FieldRef {
            class,
            name_and_type,
        })
    }

    /// Get or insert a method reference (`is_interface` selects `InterfaceMethodref`)
    pub fn get_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<ConstantIndex, Error> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.get_member_ref(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
    }

    fn get_member_ref(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let key = match &constant {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => Some((constant.tag(), *class, *name_and_type)),
            _ => None,
        };
        let key = match key {
            Some(key) => key,
            None => return self.push(constant),
        };
        if let Some(idx) = self.member_refs.get(&key) {
            return Ok(*idx);
        }
        let idx = self.push(constant)?;
        self.member_refs.insert(key, idx);
        Ok(idx)
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.integers.get(&integer) {
            return Ok(*idx);
        }
        let idx = self.push(Constant::Integer(integer))?;
        self.integers.insert(integer, idx);
        Ok(idx)
    }

    /// Floats are keyed by bit pattern, so `0.0` and `-0.0` get separate entries
    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.floats.get(&float.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push(Constant::Float(float))?;
        self.floats.insert(float.to_bits(), idx);
        Ok(idx)
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.longs.get(&long) {
            return Ok(*idx);
        }
        let idx = self.push(Constant::Long(long))?;
        self.longs.insert(long, idx);
        Ok(idx)
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        if let Some(idx) = self.doubles.get(&double.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push(Constant::Double(double))?;
        self.doubles.insert(double.to_bits(), idx);
        Ok(idx)
    }

    /// Mark a `Class` or `String` entry as resolved
    ///
    /// Afterwards, lookups of the entry are answered from the resolved value rather than by
    /// following the symbolic reference to its `Utf8` entry.
    pub fn resolve(&mut self, index: ConstantIndex) -> Result<(), Error> {
        let target = match self.get(index) {
            Some(Constant::Class(name)) | Some(Constant::String(name)) => self
                .utf8(*name)
                .ok_or(Error::BadConstantIndex {
                    index: name.0,
                    expected: "Utf8",
                })?
                .to_owned(),
            _ => {
                return Err(Error::BadConstantIndex {
                    index,
                    expected: "Class or String",
                })
            }
        };
        self.resolved.insert(index, target);
        Ok(())
    }

    /// Has this entry been resolved?
    pub fn is_resolved(&self, index: ConstantIndex) -> bool {
        self.resolved.contains_key(&index)
    }

    pub fn utf8(&self, index: Utf8ConstantIndex) -> Option<&str> {
        match self.get(index.0)? {
            Constant::Utf8(string) => Some(string),
            _ => None,
        }
    }

    /// Name of the class at this index, whether or not the entry is resolved
    pub fn class_name(&self, index: ConstantIndex) -> Option<&str> {
        match self.get(index)? {
            Constant::Class(name) => match self.resolved.get(&index) {
                Some(resolved) => Some(resolved),
                None => self.utf8(*name),
            },
            _ => None,
        }
    }

    /// Contents of the string constant at this index, whether or not the entry is resolved
    pub fn string(&self, index: ConstantIndex) -> Option<&str> {
        match self.get(index)? {
            Constant::String(utf8) => match self.resolved.get(&index) {
                Some(resolved) => Some(resolved),
                None => self.utf8(*utf8),
            },
            _ => None,
        }
    }

    /// Name and descriptor of a name & type constant
    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Option<(&str, &str)> {
        match self.get(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Some((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => None,
        }
    }

    /// Read the constant pool section of a class file (count first, then entries)
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<ConstantPool, Error> {
        let count = u16::deserialize(reader)?;
        let mut pool = ConstantPool::new();
        while (pool.constants.offset_len().0) < count as usize {
            let index = ConstantIndex(pool.constants.offset_len().0 as u16);
            let constant = Constant::read(reader, index)?;
            pool.push(constant)?;
        }
        Ok(pool)
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

/// Count first (which is one more than the largest index), then the entries
impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        (self.constants.offset_len().0 as u16).serialize(writer)?;
        for (_, constant) in &self.constants {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the null character
    /// `\u{0000}` and the encoding of supplementary characters is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Tag byte identifying the kind of constant in the class file
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef { .. } => 9,
            Constant::MethodRef {
                is_interface: false,
                ..
            } => 10,
            Constant::MethodRef {
                is_interface: true,
                ..
            } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType { .. } => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
        }
    }

    /// Read one constant pool entry (`index` is only used for error reporting)
    fn read<R: ReadBytesExt>(reader: &mut R, index: ConstantIndex) -> Result<Constant, Error> {
        let utf8 = |reader: &mut R| -> IoResult<Utf8ConstantIndex> {
            Ok(Utf8ConstantIndex(ConstantIndex(u16::deserialize(reader)?)))
        };
        let name_and_type = |reader: &mut R| -> IoResult<NameAndTypeConstantIndex> {
            Ok(NameAndTypeConstantIndex(ConstantIndex(u16::deserialize(
                reader,
            )?)))
        };
        let class = |reader: &mut R| -> IoResult<ClassConstantIndex> {
            Ok(ClassConstantIndex(ConstantIndex(u16::deserialize(reader)?)))
        };

        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = super::read_bytes(reader, len as usize)?;
                Constant::Utf8(decode_modified_utf8(&bytes)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(utf8(reader)?),
            8 => Constant::String(utf8(reader)?),
            9 => Constant::FieldRef {
                class: class(reader)?,
                name_and_type: name_and_type(reader)?,
            },
            10 | 11 => Constant::MethodRef {
                class: class(reader)?,
                name_and_type: name_and_type(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: utf8(reader)?,
                descriptor: utf8(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex(u16::deserialize(reader)?),
            },
            16 => Constant::MethodType {
                descriptor: utf8(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: name_and_type(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: name_and_type(reader)?,
            },
            19 => Constant::Module(utf8(reader)?),
            20 => Constant::Package(utf8(reader)?),
            _ => return Err(Error::BadConstantTag { index, tag }),
        };
        Ok(constant)
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.tag().serialize(writer)?;
        match self {
            Constant::Utf8(string) => {
                let buffer: Vec<u8> = encode_modified_utf8(string);
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => integer.serialize(writer)?,
            Constant::Float(float) => float.serialize(writer)?,
            Constant::Long(long) => long.serialize(writer)?,
            Constant::Double(double) => double.serialize(writer)?,
            Constant::Class(name) => name.0.serialize(writer)?,
            Constant::String(utf8) => utf8.0.serialize(writer)?,
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.0.serialize(writer)?;
                name_and_type.0.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                name.0.serialize(writer)?;
                descriptor.0.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => descriptor.0.serialize(writer)?,
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                bootstrap_method.serialize(writer)?;
                name_and_type.0.serialize(writer)?;
            }
            Constant::Module(name) | Constant::Package(name) => name.0.serialize(writer)?,
        };
        Ok(())
    }
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> IoResult<Self> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

impl Serialize for Utf8ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for Utf8ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> IoResult<Self> {
        Ok(Utf8ConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}

impl Serialize for ClassConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ClassConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> IoResult<Self> {
        Ok(ClassConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> IoResult<Self> {
        let kind = match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                let msg = format!("Invalid method handle kind {}", other);
                return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(kind)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007F => buffer.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
            _ => {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Each 1-3 byte group decodes to one UTF-16 code unit. Unpaired surrogates become U+FFFD.
pub fn decode_modified_utf8(bytes: &[u8]) -> IoResult<String> {
    let invalid = || std::io::Error::new(ErrorKind::InvalidData, "Invalid modified UTF-8");
    let continuation = |byte: Option<&u8>| -> IoResult<u16> {
        match byte {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            _ => Err(invalid()),
        }
    };

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter();
    while let Some(&b) = iter.next() {
        let unit = if b & 0b1000_0000 == 0 && b != 0 {
            b as u16
        } else if b & 0b1110_0000 == 0b1100_0000 {
            ((b & 0x1F) as u16) << 6 | continuation(iter.next())?
        } else if b & 0b1111_0000 == 0b1110_0000 {
            let hi = continuation(iter.next())?;
            let lo = continuation(iter.next())?;
            ((b & 0x0F) as u16) << 12 | hi << 6 | lo
        } else {
            return Err(invalid());
        };
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}
