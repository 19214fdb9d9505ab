use crate::jvm::{BinaryName, Error, MethodAccessFlags, MethodDescriptor, UnqualifiedName};
use crate::util::Width;

/// What a code builder needs to know about the method whose body it is building
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    /// Class declaring the method
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub access_flags: MethodAccessFlags,
}

impl MethodInfo {
    pub fn new(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
    ) -> MethodInfo {
        MethodInfo {
            class,
            name,
            descriptor,
            access_flags,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Local slot holding `this`
    pub fn receiver_slot(&self) -> Result<u16, Error> {
        if self.is_static() {
            Err(Error::NoReceiver)
        } else {
            Ok(0)
        }
    }

    /// Local slot holding the parameter at position `index`
    pub fn parameter_slot(&self, index: usize) -> Option<u16> {
        if index >= self.descriptor.parameters.len() {
            return None;
        }
        let receiver = if self.is_static() { 0 } else { 1 };
        let slot = receiver
            + self.descriptor.parameters[..index]
                .iter()
                .map(|parameter| parameter.width())
                .sum::<usize>();
        Some(slot as u16)
    }

    /// Number of slots taken up by the receiver and parameters
    pub fn parameter_slots(&self) -> u16 {
        self.descriptor.parameter_length(!self.is_static()) as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldType, Name};

    fn method(flags: MethodAccessFlags) -> MethodInfo {
        MethodInfo::new(
            BinaryName::from_str("me/Example").unwrap(),
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor {
                parameters: vec![FieldType::long(), FieldType::int(), FieldType::double()],
                return_type: None,
            },
            flags,
        )
    }

    #[test]
    fn instance_slots() {
        let method = method(MethodAccessFlags::PUBLIC);
        assert_eq!(method.receiver_slot().unwrap(), 0);
        assert_eq!(method.parameter_slot(0), Some(1));
        assert_eq!(method.parameter_slot(1), Some(3));
        assert_eq!(method.parameter_slot(2), Some(4));
        assert_eq!(method.parameter_slot(3), None);
        assert_eq!(method.parameter_slots(), 6);
    }

    #[test]
    fn static_slots() {
        let method = method(MethodAccessFlags::STATIC);
        assert!(matches!(method.receiver_slot(), Err(Error::NoReceiver)));
        assert_eq!(method.parameter_slot(0), Some(0));
        assert_eq!(method.parameter_slot(2), Some(3));
        assert_eq!(method.parameter_slots(), 5);
    }
}
