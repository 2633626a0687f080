//! Type registry for dynamic channel creation

use super::sender::{ChannelMessage, Sender};
use crossbeam_channel::{Sender as CrossbeamSender, bounded};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type ChannelCreatorFn = Box<dyn Fn(usize) -> (Box<dyn Any + Send>, Box<dyn Any + Send>) + Send + Sync>;
type OutputWrapperFn = Box<dyn Fn(Vec<Box<dyn Any + Send>>) -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// Creates typed channels and broadcast senders from a `TypeId`
pub(crate) struct TypeRegistry {
    channel_creators: HashMap<TypeId, ChannelCreatorFn>,
    output_wrappers: HashMap<TypeId, OutputWrapperFn>,
}

impl TypeRegistry {
    fn new() -> Self {
        Self {
            channel_creators: HashMap::new(),
            output_wrappers: HashMap::new(),
        }
    }

    fn register<T: 'static + Send + Clone>(&mut self) {
        let type_id = TypeId::of::<T>();

        // Channels carry ChannelMessage<T> internally
        self.channel_creators.insert(
            type_id,
            Box::new(|buffer_size: usize| {
                let (tx, rx) = bounded::<ChannelMessage<T>>(buffer_size);
                (
                    Box::new(tx) as Box<dyn Any + Send>,
                    Box::new(rx) as Box<dyn Any + Send>,
                )
            }),
        );

        // Fan all senders of one output port into a single broadcast Sender
        self.output_wrappers.insert(
            type_id,
            Box::new(|senders: Vec<Box<dyn Any + Send>>| {
                let typed = senders
                    .into_iter()
                    .map(|s| s.downcast::<CrossbeamSender<ChannelMessage<T>>>().ok().map(|tx| *tx))
                    .collect::<Option<Vec<_>>>()?;
                Some(Box::new(Sender::new(typed)) as Box<dyn Any + Send>)
            }),
        );
    }

    pub(crate) fn create_channel(
        &self,
        type_id: TypeId,
        buffer_size: usize,
    ) -> Option<(Box<dyn Any + Send>, Box<dyn Any + Send>)> {
        self.channel_creators.get(&type_id).map(|creator| creator(buffer_size))
    }

    pub(crate) fn wrap_output(
        &self,
        type_id: TypeId,
        senders: Vec<Box<dyn Any + Send>>,
    ) -> Option<Box<dyn Any + Send>> {
        self.output_wrappers.get(&type_id).and_then(|wrap| wrap(senders))
    }
}

lazy_static::lazy_static! {
    pub(crate) static ref TYPE_REGISTRY: Arc<Mutex<TypeRegistry>> = {
        let mut registry = TypeRegistry::new();

        use crate::nodes::decoders::{Annotation, SpiPacket};
        use crate::runtime::sample::{LogicSample, Sample};
        registry.register::<Sample>();
        registry.register::<LogicSample>();
        registry.register::<SpiPacket>();
        registry.register::<Annotation>();

        Arc::new(Mutex::new(registry))
    };
}

/// Register a custom type for use in pipelines
/// Call this before building pipelines that use custom types
pub fn register_type<T: 'static + Send + Clone>() {
    TYPE_REGISTRY.lock().unwrap().register::<T>();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_registered() {
        use crate::nodes::decoders::Annotation;
        let registry = TYPE_REGISTRY.lock().unwrap();
        assert!(registry.create_channel(TypeId::of::<Annotation>(), 4).is_some());
        assert!(registry.create_channel(TypeId::of::<String>(), 4).is_none());
    }

    #[test]
    fn test_wrap_output_rejects_wrong_sender_type() {
        register_type::<u16>();
        let registry = TYPE_REGISTRY.lock().unwrap();
        let (tx, _rx) = registry.create_channel(TypeId::of::<u16>(), 4).unwrap();
        assert!(registry.wrap_output(TypeId::of::<u16>(), vec![tx]).is_some());

        let bogus: Box<dyn Any + Send> = Box::new(0u8);
        assert!(registry.wrap_output(TypeId::of::<u16>(), vec![bogus]).is_none());
    }
}
