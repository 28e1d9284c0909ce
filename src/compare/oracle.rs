use crate::jvm::{Constant, ConstantIndex, ConstantPool, HandleKind};

/// Semantic lookups into a constant pool, by raw operand index
///
/// Implementations must see through resolution: a resolved entry and a still-symbolic entry that
/// denote the same target have to produce the same answer.
pub trait ConstantPoolOracle {
    /// Internal name of the class at the index (`None` if the entry is not a class)
    fn class_name_at(&self, index: u16) -> Option<&str>;

    /// Owner, name, and descriptor of the field or method reference at the index
    fn member_ref_at(&self, index: u16) -> Option<MemberRef<'_>>;

    /// Value of the constant loaded by `ldc`, `ldc_w`, or `ldc2_w` from the index
    fn loadable_at(&self, index: u16) -> Option<LoadableConstant<'_>>;
}

/// Symbolic identity of a field or method
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Constant that can be pushed onto the stack by one of the `ldc` instructions
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LoadableConstant<'a> {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(&'a str),

    /// Class literal, by internal name
    Class(&'a str),

    /// Method type, by descriptor
    MethodType(&'a str),

    MethodHandle {
        kind: HandleKind,
        member: MemberRef<'a>,
    },

    /// Dynamically-computed constant (its value comes from a bootstrap method)
    Dynamic,
}

impl ConstantPoolOracle for ConstantPool {
    fn class_name_at(&self, index: u16) -> Option<&str> {
        self.class_name(ConstantIndex(index))
    }

    fn member_ref_at(&self, index: u16) -> Option<MemberRef<'_>> {
        let (class, name_and_type) = match self.get(ConstantIndex(index))? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => (*class, *name_and_type),
            _ => return None,
        };
        let owner = self.class_name(class.0)?;
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Some(MemberRef {
            owner,
            name,
            descriptor,
        })
    }

    fn loadable_at(&self, index: u16) -> Option<LoadableConstant<'_>> {
        let index = ConstantIndex(index);
        let loadable = match self.get(index)? {
            Constant::Integer(integer) => LoadableConstant::Integer(*integer),
            Constant::Float(float) => LoadableConstant::Float(*float),
            Constant::Long(long) => LoadableConstant::Long(*long),
            Constant::Double(double) => LoadableConstant::Double(*double),
            Constant::String(_) => LoadableConstant::String(self.string(index)?),
            Constant::Class(_) => LoadableConstant::Class(self.class_name(index)?),
            Constant::MethodType { descriptor } => {
                LoadableConstant::MethodType(self.utf8(*descriptor)?)
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => LoadableConstant::MethodHandle {
                kind: *handle_kind,
                member: self.member_ref_at(member.0)?,
            },
            Constant::Dynamic { .. } => LoadableConstant::Dynamic,
            _ => return None,
        };
        Some(loadable)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookups_ignore_index_layout() {
        let mut first = ConstantPool::new();
        let mut second = ConstantPool::new();
        second.get_utf8("padding").unwrap();
        second.get_long(7).unwrap();

        let field_a = first.get_field_ref("me/Point", "x", "I").unwrap();
        let field_b = second.get_field_ref("me/Point", "x", "I").unwrap();
        assert_ne!(field_a, field_b);
        assert_eq!(
            first.member_ref_at(field_a.0),
            second.member_ref_at(field_b.0)
        );
        assert_eq!(
            first.member_ref_at(field_a.0),
            Some(MemberRef {
                owner: "me/Point",
                name: "x",
                descriptor: "I",
            })
        );

        let class = first.get_class("me/Point").unwrap();
        assert_eq!(first.class_name_at(class.0 .0), Some("me/Point"));
        assert_eq!(first.class_name_at(field_a.0), None);
        assert_eq!(first.member_ref_at(class.0 .0), None);
    }

    #[test]
    fn loadable_constants() {
        let mut pool = ConstantPool::new();
        let five = pool.get_integer(5).unwrap();
        let half = pool.get_float(0.5).unwrap();
        let big = pool.get_long(1 << 40).unwrap();
        let text = pool.get_string("x").unwrap();
        let class = pool.get_class("java/util/List").unwrap();

        assert_eq!(pool.loadable_at(five.0), Some(LoadableConstant::Integer(5)));
        assert_eq!(pool.loadable_at(half.0), Some(LoadableConstant::Float(0.5)));
        assert_eq!(pool.loadable_at(big.0), Some(LoadableConstant::Long(1 << 40)));
        assert_eq!(pool.loadable_at(text.0), Some(LoadableConstant::String("x")));
        assert_eq!(
            pool.loadable_at(class.0 .0),
            Some(LoadableConstant::Class("java/util/List"))
        );

        pool.resolve(text).unwrap();
        assert_eq!(pool.loadable_at(text.0), Some(LoadableConstant::String("x")));

        let utf8 = pool.get_utf8("x").unwrap();
        assert_eq!(pool.loadable_at(utf8.0 .0), None);
        assert_eq!(pool.loadable_at(0), None);
    }
}
