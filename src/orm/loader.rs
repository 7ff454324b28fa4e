use std::marker::PhantomData;

use async_trait::async_trait;

use super::entity::Entity;
use crate::context::Ctx;
use crate::error::Result;
use crate::graph::Graph;
use crate::spec::{EdgeLoad, EdgeSpec, NodeSpec, Value};
use crate::sql::{OrderTerm, Predicate};

type Attach<'a, P, C> = Box<dyn FnMut(&mut P, C) + Send + 'a>;

/// Eager load of the `C` neighbors of `P` entities over one edge. Every
/// neighbor is handed to `attach` once per parent it belongs to.
pub struct EdgeLoader<'a, P, C> {
    edge: EdgeSpec,
    predicate: Option<Predicate>,
    order: Vec<OrderTerm>,
    attach: Attach<'a, P, C>,
    _child: PhantomData<fn() -> C>,
}

impl<'a, P: Entity, C: Entity + Clone> EdgeLoader<'a, P, C> {
    pub fn new(edge: EdgeSpec, attach: impl FnMut(&mut P, C) + Send + 'a) -> Self {
        Self {
            edge,
            predicate: None,
            order: Vec::new(),
            attach: Box::new(attach),
            _child: PhantomData,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    pub fn order_by(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }
}

#[async_trait]
pub(crate) trait LoadEdges<P: Send>: Send {
    /// Parent column the neighbors are keyed by.
    fn key_column(&self, parent: &NodeSpec) -> String;

    async fn load(&mut self, graph: &Graph, ctx: &Ctx, parents: &mut [P]) -> Result<usize>;
}

#[async_trait]
impl<P: Entity, C: Entity + Clone> LoadEdges<P> for EdgeLoader<'_, P, C> {
    fn key_column(&self, parent: &NodeSpec) -> String {
        if self.edge.writes_own_column() {
            self.edge.columns.first().cloned().unwrap_or_default()
        } else {
            parent.id.column.clone()
        }
    }

    async fn load(&mut self, graph: &Graph, ctx: &Ctx, parents: &mut [P]) -> Result<usize> {
        let key_column = self.key_column(&P::node_spec());
        let keys: Vec<Value> = parents.iter().map(|p| p.value(&key_column)).collect();
        let mut found: Vec<(Vec<usize>, C)> = Vec::new();
        {
            let sink = &mut found;
            let mut load = EdgeLoad::new(
                self.edge.clone(),
                C::node_spec(),
                Box::new(|columns| Ok(C::scan_types(columns))),
                Box::new(move |positions, columns, values| {
                    sink.push((positions.to_vec(), C::from_values(columns, values)?));
                    Ok(())
                }),
            );
            load.predicate = self.predicate.clone();
            load.order = self.order.clone();
            graph.load_edge(ctx, &mut load, &keys).await?;
        }

        let n = found.len();
        for (positions, child) in found {
            let Some((&last, rest)) = positions.split_last() else {
                continue;
            };
            for &i in rest {
                (self.attach)(&mut parents[i], child.clone());
            }
            (self.attach)(&mut parents[last], child);
        }
        Ok(n)
    }
}
