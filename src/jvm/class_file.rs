use super::{
    read_bytes, BytecodeStream, ClassAccessFlags, ClassConstantIndex, ConstantPool, Deserialize,
    Error, MethodAccessFlags, MethodDescriptor, ParseDescriptor, Serialize, Utf8ConstantIndex,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::fs;
use std::io::{BufReader, Cursor, Result as IoResult};
use std::path::Path;
use std::result::Result;

/// Representation of the [`class` file format of the JVM][0]
///
/// Only methods get a structured representation (their `Code` attribute is decoded into a
/// [`MethodBody`]). Fields and all other attributes are carried along as raw bytes so that a class
/// that is read in can be written back out unchanged.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Index 0 for `java/lang/Object`, which has no superclass
    pub super_class: ClassConstantIndex,

    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Java 8
    const DEFAULT_MAJOR_VERSION: u16 = 52;

    /// Empty public class with the given internal name and superclass
    pub fn new(name: &str, super_name: &str) -> Result<ClassFile, Error> {
        let mut constants = ConstantPool::new();
        let this_class = constants.get_class(name)?;
        let super_class = constants.get_class(super_name)?;
        Ok(ClassFile {
            minor_version: 0,
            major_version: ClassFile::DEFAULT_MAJOR_VERSION,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        })
    }

    /// Add a method to the class
    ///
    /// The parameter slot count of `body` is recomputed from the descriptor and the access flags.
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        body: Option<MethodBody>,
    ) -> Result<(), Error> {
        let parameter_slots = parameter_slots(access_flags, descriptor)?;
        let name_index = self.constants.get_utf8(name)?;
        let descriptor_index = self.constants.get_utf8(descriptor)?;
        let code = match body {
            None => None,
            Some(body) => Some(CodeAttribute {
                name_index: self.constants.get_utf8(CodeAttribute::NAME)?,
                body: MethodBody {
                    parameter_slots,
                    ..body
                },
            }),
        };
        self.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            code,
            attributes: vec![],
        });
        Ok(())
    }

    /// Internal name of the class (eg. `java/lang/String`)
    pub fn class_name(&self) -> Option<&str> {
        self.constants.class_name(self.this_class.0)
    }

    pub fn method_name(&self, method: &Method) -> Option<&str> {
        self.constants.utf8(method.name_index)
    }

    pub fn method_descriptor(&self, method: &Method) -> Option<&str> {
        self.constants.utf8(method.descriptor_index)
    }

    /// Find a method by name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.methods.iter().find(|method| {
            self.method_name(method) == Some(name)
                && self.method_descriptor(method) == Some(descriptor)
        })
    }

    /// Parse a class file
    pub fn read<R: ReadBytesExt>(reader: &mut R) -> Result<ClassFile, Error> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let minor_version = u16::deserialize(reader)?;
        let major_version = u16::deserialize(reader)?;
        let constants = ConstantPool::read(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = ClassConstantIndex::deserialize(reader)?;
        let interfaces = Vec::<ClassConstantIndex>::deserialize(reader)?;
        let fields = Vec::<Field>::deserialize(reader)?;

        let method_count = u16::deserialize(reader)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(Method::read(reader, &constants)?);
        }

        let attributes = Vec::<Attribute>::deserialize(reader)?;

        Ok(ClassFile {
            minor_version,
            major_version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Read a class file from disk
    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<ClassFile, Error> {
        let mut reader = BufReader::new(fs::File::open(path)?);
        ClassFile::read(&mut reader)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

/// Number of local variable slots the parameters take up on entry, including `this`
fn parameter_slots(access_flags: MethodAccessFlags, descriptor: &str) -> Result<u16, Error> {
    let parsed = MethodDescriptor::parse(descriptor)
        .map_err(|_| Error::BadDescriptor(descriptor.to_owned()))?;
    let receiver = if access_flags.contains(MethodAccessFlags::STATIC) {
        0
    } else {
        1
    };
    Ok((parsed.parameter_length() + receiver) as u16)
}

/// Field declared by a class, kept as-is
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug, Clone)]
pub struct Field {
    pub access_flags: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Field {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Field {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> IoResult<Self> {
        Ok(Field {
            access_flags: u16::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::<Attribute>::deserialize(reader)?,
        })
    }
}

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,

    /// Abstract and native methods have no code
    pub code: Option<CodeAttribute>,

    /// Attributes other than `Code`
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn body(&self) -> Option<&MethodBody> {
        self.code.as_ref().map(|code| &code.body)
    }

    fn read<R: ReadBytesExt>(reader: &mut R, constants: &ConstantPool) -> Result<Method, Error> {
        let access_flags = MethodAccessFlags::deserialize(reader)?;
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let descriptor_index = Utf8ConstantIndex::deserialize(reader)?;
        let descriptor = constants
            .utf8(descriptor_index)
            .ok_or(Error::BadConstantIndex {
                index: descriptor_index.0,
                expected: "Utf8",
            })?;
        let parameter_slots = parameter_slots(access_flags, descriptor)?;

        let mut code = None;
        let mut attributes = vec![];
        for attribute in Vec::<Attribute>::deserialize(reader)? {
            if code.is_none() && constants.utf8(attribute.name_index) == Some(CodeAttribute::NAME) {
                let body = MethodBody::read(&mut Cursor::new(&attribute.info), parameter_slots)?;
                code = Some(CodeAttribute {
                    name_index: attribute.name_index,
                    body,
                });
            } else {
                attributes.push(attribute);
            }
        }

        Ok(Method {
            access_flags,
            name_index,
            descriptor_index,
            code,
            attributes,
        })
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;

        let attribute_count = self.attributes.len() + self.code.iter().count();
        (attribute_count as u16).serialize(writer)?;
        if let Some(code) = &self.code {
            code.serialize(writer)?;
        }
        for attribute in &self.attributes {
            attribute.serialize(writer)?;
        }
        Ok(())
    }
}

/// Undecoded attribute (used in classes, fields, methods, and on the `Code` attribute)
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> IoResult<Self> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

/// `Code` attribute of a method
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone)]
pub struct CodeAttribute {
    pub name_index: Utf8ConstantIndex,
    pub body: MethodBody,
}

impl CodeAttribute {
    pub const NAME: &'static str = "Code";
}

impl Serialize for CodeAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        let mut info = vec![];
        self.body.serialize(&mut info)?;
        Attribute {
            name_index: self.name_index,
            info,
        }
        .serialize(writer)
    }
}

/// Code of a method, along with the frame sizes it was compiled for
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    pub max_stack: u16,
    pub max_locals: u16,

    /// Local variable slots taken by the parameters on entry (including `this` for instance
    /// methods). This is not stored in the class file: it comes from the method descriptor.
    pub parameter_slots: u16,

    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,

    /// Attributes of the code (line numbers, stack maps, ...), undecoded
    pub attributes: Vec<Attribute>,
}

impl MethodBody {
    pub fn new(code: Vec<u8>, max_stack: u16, max_locals: u16, parameter_slots: u16) -> MethodBody {
        MethodBody {
            max_stack,
            max_locals,
            parameter_slots,
            code,
            exception_table: vec![],
            attributes: vec![],
        }
    }

    /// Length of the code array in bytes
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    /// Decode the instructions of the body
    pub fn stream(&self) -> BytecodeStream<'_> {
        BytecodeStream::new(&self.code)
    }

    fn read<R: ReadBytesExt>(reader: &mut R, parameter_slots: u16) -> Result<MethodBody, Error> {
        let max_stack = u16::deserialize(reader)?;
        let max_locals = u16::deserialize(reader)?;
        let code_len = u32::deserialize(reader)?;
        let code = read_bytes(reader, code_len as usize)?;
        let exception_table = Vec::<ExceptionHandler>::deserialize(reader)?;
        let attributes = Vec::<Attribute>::deserialize(reader)?;
        Ok(MethodBody {
            max_stack,
            max_locals,
            parameter_slots,
            code,
            exception_table,
            attributes,
        })
    }
}

impl Serialize for MethodBody {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.code.len() as u32).serialize(writer)?;
        writer.write_all(&self.code)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Index 0 catches everything
    pub catch_type: ClassConstantIndex,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> IoResult<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> IoResult<Self> {
        Ok(ExceptionHandler {
            start_pc: u16::deserialize(reader)?,
            end_pc: u16::deserialize(reader)?,
            handler_pc: u16::deserialize(reader)?,
            catch_type: ClassConstantIndex::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{CodeBuilder, Opcode};

    fn sample_class() -> ClassFile {
        let mut class = ClassFile::new("me/Sample", "java/lang/Object").unwrap();
        let greeting = class.constants.get_string("hello").unwrap();

        let mut code = CodeBuilder::new();
        code.ldc(greeting).op(Opcode::AReturn);
        let body = MethodBody::new(code.finish().unwrap(), 1, 1, 0);
        class
            .add_method(
                MethodAccessFlags::PUBLIC,
                "greet",
                "()Ljava/lang/String;",
                Some(body),
            )
            .unwrap();

        let mut code = CodeBuilder::new();
        code.op(Opcode::LLoad0).op(Opcode::LReturn);
        let body = MethodBody::new(code.finish().unwrap(), 2, 3, 0);
        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                "identity",
                "(JI)J",
                Some(body),
            )
            .unwrap();

        class
            .add_method(
                MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
                "later",
                "(D)V",
                None,
            )
            .unwrap();
        class
    }

    #[test]
    fn parameter_slots_come_from_the_descriptor() {
        let class = sample_class();
        let greet = class.find_method("greet", "()Ljava/lang/String;").unwrap();
        assert_eq!(greet.body().unwrap().parameter_slots, 1);
        let identity = class.find_method("identity", "(JI)J").unwrap();
        assert_eq!(identity.body().unwrap().parameter_slots, 3);
        assert!(class.find_method("later", "(D)V").unwrap().body().is_none());
        assert!(class.find_method("greet", "()V").is_none());
    }

    #[test]
    fn round_trip() {
        let class = sample_class();
        let mut bytes = vec![];
        class.serialize(&mut bytes).unwrap();
        assert_eq!(&bytes[0..4], &ClassFile::MAGIC);

        let read = ClassFile::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(read.class_name(), Some("me/Sample"));
        assert_eq!(read.major_version, 52);
        assert_eq!(read.methods.len(), 3);
        for method in &class.methods {
            let name = class.method_name(method).unwrap();
            let descriptor = class.method_descriptor(method).unwrap();
            let other = read.find_method(name, descriptor).unwrap();
            assert_eq!(method.body(), other.body());
            assert_eq!(method.access_flags, other.access_flags);
        }

        let mut again = vec![];
        read.serialize(&mut again).unwrap();
        assert_eq!(bytes, again);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = [0xCA, 0xFE, 0xD0, 0x0D, 0, 0, 0, 52];
        match ClassFile::read(&mut Cursor::new(&bytes[..])) {
            Err(Error::BadMagic(magic)) => assert_eq!(magic, [0xCA, 0xFE, 0xD0, 0x0D]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_bad_descriptor() {
        let mut class = ClassFile::new("me/Sample", "java/lang/Object").unwrap();
        let result = class.add_method(MethodAccessFlags::STATIC, "f", "(Q)V", None);
        assert!(matches!(result, Err(Error::BadDescriptor(_))));
    }
}
