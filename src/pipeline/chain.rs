use crate::events::{XmlConsumer, XmlEvent};
use crate::pipeline::stage::{StageInstance, Transformer};

/// The connected transformer chain ending in a sink
///
/// Each transformer forwards to exactly one downstream consumer: the rest of
/// the chain, in declaration order, and finally the sink.
pub struct Chain<'a> {
    transformers: &'a mut [StageInstance<dyn Transformer>],
    sink: &'a mut dyn XmlConsumer,
}

impl<'a> Chain<'a> {
    pub(crate) fn new(
        transformers: &'a mut [StageInstance<dyn Transformer>],
        sink: &'a mut dyn XmlConsumer,
    ) -> Self {
        Chain { transformers, sink }
    }

    /// Number of transformers in front of the sink
    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}

impl XmlConsumer for Chain<'_> {
    fn event(&mut self, event: XmlEvent) -> anyhow::Result<()> {
        match self.transformers.split_first_mut() {
            None => self.sink.event(event),
            Some((head, rest)) => {
                let mut next = Chain {
                    transformers: rest,
                    sink: &mut *self.sink,
                };
                head.instance.transform(event, &mut next)
            }
        }
    }
}
