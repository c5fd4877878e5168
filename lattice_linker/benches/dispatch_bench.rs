//! Dispatch hot-path benchmarks.
//!
//! Measures the costs that matter after linking has settled: a monomorphic
//! chain hit, a polymorphic walk past a failing guard, and a pairwise cache
//! hit. Relinking itself is the cold path and is not benchmarked.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lattice_core::{
    CallerContext, DispatchDescriptor, LinkError, ObjectValue, Operation, ScopeGraph, ScopeId,
    Signature, TypeId, TypeRegistry, Value,
};
use lattice_linker::{
    Computed, DispatchCallSite, DispatchResolver, DynamicLinker, GuardedInvocation, LinkRequest,
    LinkerBuilder, LinkerServices, PairwiseCache, TargetFn,
};
use std::sync::Arc;

struct BenchResolver {
    only: TypeId,
}

impl DispatchResolver for BenchResolver {
    fn name(&self) -> &'static str {
        "bench-typed"
    }

    fn try_link(
        &self,
        request: &LinkRequest<'_>,
        _services: &LinkerServices<'_>,
    ) -> Result<Option<GuardedInvocation>, LinkError> {
        if request.receiver().map(|v| v.type_id()) != Some(self.only) {
            return Ok(None);
        }
        let target: TargetFn = Arc::new(|_| Ok(Value::Int(1)));
        let only = self.only;
        let guard = Arc::new(move |args: &[Value]| {
            args.first().map(|v| v.type_id()) == Some(only)
        });
        Ok(Some(GuardedInvocation::guarded(
            target,
            guard,
            request.descriptor().signature().clone(),
        )))
    }
}

struct BenchFallback;

impl DispatchResolver for BenchFallback {
    fn name(&self) -> &'static str {
        "bench-fallback"
    }

    fn try_link(
        &self,
        request: &LinkRequest<'_>,
        _services: &LinkerServices<'_>,
    ) -> Result<Option<GuardedInvocation>, LinkError> {
        let target: TargetFn = Arc::new(|_| Ok(Value::Int(2)));
        Ok(Some(GuardedInvocation::unconditional(
            target,
            request.descriptor().signature().clone(),
        )))
    }
}

fn harness() -> (Arc<TypeRegistry>, TypeId) {
    let scopes = Arc::new(ScopeGraph::new());
    let app = scopes.child(ScopeId::ROOT, "app");
    let registry = Arc::new(TypeRegistry::new(scopes));
    let x_ty = registry.register("x", app);
    (registry, x_ty)
}

fn linked_site(
    registry: &Arc<TypeRegistry>,
    x_ty: TypeId,
) -> (DynamicLinker, Arc<DispatchCallSite>) {
    let linker = LinkerBuilder::new(Arc::clone(registry))
        .with_discovery(false)
        .with_resolver(Arc::new(BenchResolver { only: x_ty }) as _)
        .with_fallback_resolver(Arc::new(BenchFallback) as _)
        .build();
    let site = linker.link(Arc::new(DispatchCallSite::new(DispatchDescriptor::new(
        CallerContext::public(),
        Operation::call(),
        Signature::new(&[TypeId::ANY], TypeId::ANY),
    ))));
    (linker, site)
}

fn bench_call_site(c: &mut Criterion) {
    let (registry, x_ty) = harness();
    let mut group = c.benchmark_group("call_site");

    group.bench_function("monomorphic_hit", |b| {
        let (linker, site) = linked_site(&registry, x_ty);
        let x_value = Value::object(ObjectValue::new(x_ty));
        // Warm: install the guarded link.
        let _ = site.invoke(&linker, &[x_value.clone()]);
        b.iter(|| black_box(site.invoke(&linker, &[x_value.clone()])))
    });

    group.bench_function("polymorphic_second_link_hit", |b| {
        let (linker, site) = linked_site(&registry, x_ty);
        let x_value = Value::object(ObjectValue::new(x_ty));
        // Warm: chain of [type-guarded, universal].
        let _ = site.invoke(&linker, &[x_value.clone()]);
        let _ = site.invoke(&linker, &[Value::Int(0)]);
        b.iter(|| black_box(site.invoke(&linker, &[Value::Int(7)])))
    });

    group.finish();
}

fn bench_pairwise_cache(c: &mut Criterion) {
    let (registry, x_ty) = harness();
    let cache: PairwiseCache<u64> = PairwiseCache::new(Arc::clone(&registry));
    // Warm: publish one related pair.
    cache.get(TypeId::ANY, x_ty, |_, _| Computed::Publish(1));

    c.bench_function("pairwise_forward_hit", |b| {
        b.iter(|| black_box(cache.get(TypeId::ANY, x_ty, |_, _| Computed::Absent)))
    });
}

fn bench_conversion(c: &mut Criterion) {
    let (registry, _) = harness();
    let linker = LinkerBuilder::new(Arc::clone(&registry))
        .with_discovery(false)
        .build();
    let public = CallerContext::public();

    c.bench_function("widening_converter", |b| {
        let conv = linker
            .conversions()
            .convert(TypeId::INT, TypeId::FLOAT, &public);
        b.iter(|| black_box(conv(&Value::Int(9))))
    });
}

criterion_group!(
    benches,
    bench_call_site,
    bench_pairwise_cache,
    bench_conversion
);
criterion_main!(benches);
