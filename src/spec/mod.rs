//! Spec model: dialect-independent descriptions of graph operations.

mod edge;
mod node;
mod ops;
mod step;
mod value;

pub use edge::{EdgeMut, EdgeSpec, EdgeTarget, RelationKind};
pub use node::{FieldSpec, IdStrategy, NodeSpec};
pub use ops::{
    Assign, BatchCreateSpec, CreateSpec, DeleteSpec, EdgeAssign, EdgeLoad, EdgeQuerySpec,
    FieldMut, LoadAssign, QuerySpec, ScanValues, UpdateSpec,
};
pub use step::{Step, StepEdge, StepFrom, StepTo};
pub use value::{FieldType, Key, Value};
