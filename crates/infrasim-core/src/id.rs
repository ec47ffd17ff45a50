use slotmap::new_key_type;

new_key_type! {
    /// Identifies an element in a scenario's element arena.
    pub struct ElementId;

    /// Identifies a node (named place) that locations refer to.
    pub struct NodeId;
}
