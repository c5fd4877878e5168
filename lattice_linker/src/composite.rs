//! Priority-ordered composition of resolver components.

use crate::invocation::GuardedInvocation;
use crate::resolver::{DispatchResolver, LinkRequest, LinkerServices};
use dashmap::DashMap;
use lattice_core::{LinkError, TypeId};
use rustc_hash::FxBuildHasher;
use std::sync::Arc;

/// Queries resolver components in fixed priority order, first match wins.
///
/// As an optimization, components are grouped by the runtime type of the
/// receiver argument: a component declaring (via
/// [`TypeSelective`](crate::resolver::TypeSelective)) that it only handles
/// other types is skipped. The memoized subset only ever removes components
/// that would decline anyway, so the first-match result is identical to a
/// linear scan.
pub struct CompositeResolver {
    components: Box<[Arc<dyn DispatchResolver>]>,
    by_receiver: DashMap<TypeId, Arc<[u32]>, FxBuildHasher>,
}

impl CompositeResolver {
    pub(crate) fn new(components: Vec<Arc<dyn DispatchResolver>>) -> Self {
        Self {
            components: components.into_boxed_slice(),
            by_receiver: DashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn components(&self) -> &[Arc<dyn DispatchResolver>] {
        &self.components
    }

    /// Component kinds in priority order.
    pub fn component_kinds(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Offer the request to each component in priority order.
    ///
    /// Component errors are propagated verbatim; a decline moves on to the
    /// next component.
    pub fn try_link(
        &self,
        request: &LinkRequest<'_>,
        services: &LinkerServices<'_>,
    ) -> Result<Option<GuardedInvocation>, LinkError> {
        match request.receiver() {
            Some(receiver) => {
                let indices = self.applicable_for(receiver.type_id());
                for &i in indices.iter() {
                    if let Some(found) =
                        self.components[i as usize].try_link(request, services)?
                    {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            None => {
                for component in self.components.iter() {
                    if let Some(found) = component.try_link(request, services)? {
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
        }
    }

    fn applicable_for(&self, ty: TypeId) -> Arc<[u32]> {
        if let Some(hit) = self.by_receiver.get(&ty) {
            return Arc::clone(hit.value());
        }
        let selected: Arc<[u32]> = self
            .components
            .iter()
            .enumerate()
            .filter(|(_, component)| {
                component
                    .as_type_selective()
                    .map_or(true, |selective| selective.can_link_type(ty))
            })
            .map(|(i, _)| i as u32)
            .collect::<Vec<u32>>()
            .into();
        self.by_receiver.insert(ty, Arc::clone(&selected));
        selected
    }
}
