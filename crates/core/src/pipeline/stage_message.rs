/// Envelope carried by every inter-stage channel.
///
/// `Terminate` is pushed once into the first channel; each stage forwards it
/// to its own output exactly once and then exits.
#[derive(Clone, Debug, PartialEq)]
pub enum StageMessage<T> {
    Item(T),
    Terminate,
}

