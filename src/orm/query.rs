use std::marker::PhantomData;

use super::entity::Entity;
use super::loader::{EdgeLoader, LoadEdges};
use crate::context::Ctx;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::spec::{QuerySpec, Step, Value};
use crate::sql::{OrderTerm, Predicate, Selector};

/// Typed selection of `E` entities.
pub struct EntityQuery<'g, E: Entity> {
    graph: &'g Graph,
    columns: Vec<String>,
    from: Option<Selector>,
    predicate: Option<Predicate>,
    order: Vec<OrderTerm>,
    limit: Option<u64>,
    offset: Option<u64>,
    unique: bool,
    loaders: Vec<Box<dyn LoadEdges<E> + 'g>>,
    _entity: PhantomData<fn() -> E>,
}

impl Graph {
    pub fn query<E: Entity>(&self) -> EntityQuery<'_, E> {
        EntityQuery {
            graph: self,
            columns: Vec::new(),
            from: None,
            predicate: None,
            order: Vec::new(),
            limit: None,
            offset: None,
            unique: false,
            loaders: Vec::new(),
            _entity: PhantomData,
        }
    }
}

impl<'g, E: Entity> EntityQuery<'g, E> {
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(Predicate::conjoin(self.predicate.take(), predicate));
        self
    }

    pub fn order_by(mut self, term: OrderTerm) -> Self {
        self.order.push(term);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Select the neighbors reached by `step` instead of the whole table.
    pub fn from_step(mut self, step: &Step) -> Self {
        self.from = Some(step.neighbors());
        self.unique = true;
        self
    }

    pub fn with_edge<C: Entity + Clone>(mut self, loader: EdgeLoader<'g, E, C>) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    fn spec<'s>(&self) -> QuerySpec<'s> {
        let node = E::node_spec();
        let mut columns = self.columns.clone();
        if !columns.is_empty() {
            for loader in &self.loaders {
                let key = loader.key_column(&node);
                if !columns.contains(&key) {
                    columns.push(key);
                }
            }
        }
        QuerySpec {
            node,
            columns,
            from: self.from.clone(),
            predicate: self.predicate.clone(),
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
            unique: self.unique,
            edges: Vec::new(),
            scan_values: None,
            assign: None,
        }
    }

    async fn collect(&mut self, ctx: &Ctx, limit: Option<u64>) -> Result<Vec<E>> {
        let mut nodes = Vec::new();
        {
            let sink = &mut nodes;
            let mut spec = self.spec();
            if let Some(limit) = limit {
                spec.limit = Some(spec.limit.map_or(limit, |l| l.min(limit)));
            }
            let mut spec = spec.scan(
                Box::new(|columns| Ok(E::scan_types(columns))),
                Box::new(move |columns, values| {
                    sink.push(E::from_values(columns, values)?);
                    Ok(())
                }),
            );
            self.graph.query_nodes(ctx, &mut spec).await?;
        }
        Ok(nodes)
    }

    async fn load_edges(&mut self, ctx: &Ctx, nodes: &mut [E]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }
        for loader in &mut self.loaders {
            loader.load(self.graph, ctx, nodes).await?;
        }
        Ok(())
    }

    pub async fn all(mut self, ctx: &Ctx) -> Result<Vec<E>> {
        let mut nodes = self.collect(ctx, None).await?;
        self.load_edges(ctx, &mut nodes).await?;
        Ok(nodes)
    }

    pub async fn first(mut self, ctx: &Ctx) -> Result<E> {
        let mut nodes = self.collect(ctx, Some(1)).await?;
        self.load_edges(ctx, &mut nodes).await?;
        nodes.pop().ok_or_else(|| Error::not_found(E::LABEL))
    }

    pub async fn only(mut self, ctx: &Ctx) -> Result<E> {
        let mut nodes = self.collect(ctx, Some(2)).await?;
        match nodes.len() {
            0 => Err(Error::not_found(E::LABEL)),
            1 => {
                self.load_edges(ctx, &mut nodes).await?;
                nodes.pop().ok_or_else(|| Error::not_found(E::LABEL))
            }
            _ => Err(Error::not_singular(E::LABEL)),
        }
    }

    pub async fn ids(self, ctx: &Ctx) -> Result<Vec<Value>> {
        self.graph.ids(ctx, &mut self.spec()).await
    }

    pub async fn first_id(self, ctx: &Ctx) -> Result<Value> {
        self.graph.first_id(ctx, &mut self.spec()).await
    }

    pub async fn only_id(self, ctx: &Ctx) -> Result<Value> {
        self.graph.only_id(ctx, &mut self.spec()).await
    }

    pub async fn count(self, ctx: &Ctx) -> Result<u64> {
        self.graph.count_nodes(ctx, &mut self.spec()).await
    }

    pub async fn exist(self, ctx: &Ctx) -> Result<bool> {
        self.graph.exist(ctx, &mut self.spec()).await
    }
}
