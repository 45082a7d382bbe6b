//! The explicit, instantiable registry world each conversion graph, plan
//! cache and allocator strategy lives inside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::alloc::{AllocStrategy, SystemAlloc};
use crate::descriptor::component::Component;
use crate::descriptor::conversion::Edge;
use crate::descriptor::format::{Format, Layout};
use crate::descriptor::model::Model;
use crate::descriptor::ty::Type;
use crate::descriptor::{ComponentRef, ConversionRef, FormatRef, ModelRef, TypeRef};
use crate::error::Error;
use crate::graph::ConversionStore;
use crate::kernel::Kernel;
use crate::plan::{self, Plan};
use crate::registry::NamedTable;

/// An instantiable registry world: owns every `Type`/`Component`/`Model`/
/// `Format`/`Conversion` table, the fishing planner's plan cache, and the
/// configured allocator strategy and fatal hook.
///
/// Nothing about a `Context` is process-global: independent tests (and
/// independent extension sandboxes) can each build and tear down their own
/// world.
pub struct Context {
    pub(crate) types: NamedTable<crate::descriptor::TypeKind, Type>,
    pub(crate) components: NamedTable<crate::descriptor::ComponentKind, Component>,
    pub(crate) models: NamedTable<crate::descriptor::ModelKind, Model>,
    pub(crate) formats: NamedTable<crate::descriptor::FormatKind, Format>,
    pub(crate) conversions: ConversionStore,
    pub(crate) reference_type: Option<TypeRef>,
    reference_model: Option<ModelRef>,
    reference_format: Option<FormatRef>,
    generation: AtomicU64,
    plan_cache: RwLock<HashMap<(FormatRef, FormatRef), Arc<Plan>>>,
    fatal_hook: Box<dyn Fn(&Error) + Send + Sync>,
    alloc: Box<dyn AllocStrategy>,
}

fn default_fatal_hook(err: &Error) {
    panic!("pixelfish: fatal registration error: {err}");
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Context {
    /// An empty context: no types, components, models, formats or
    /// conversions registered. Most callers want [`Context::init`] instead,
    /// which also registers the built-in baseline and loads extensions.
    pub fn new() -> Self {
        Context {
            types: NamedTable::new("type"),
            components: NamedTable::new("component"),
            models: NamedTable::new("model"),
            formats: NamedTable::new("format"),
            conversions: ConversionStore::default(),
            reference_type: None,
            reference_model: None,
            reference_format: None,
            generation: AtomicU64::new(0),
            plan_cache: RwLock::new(HashMap::new()),
            fatal_hook: Box::new(default_fatal_hook),
            alloc: Box::new(SystemAlloc),
        }
    }

    /// Build a context with the built-in types/components/models/formats/
    /// conversions registered, then load extensions from
    /// [`crate::extension::EXTENSION_PATH_VAR`].
    pub fn init() -> Result<Context, Error> {
        let mut ctx = Context::new();
        crate::builtins::register(&mut ctx)?;
        let loaded = ctx.load_extensions();
        tracing::info!(extensions_loaded = loaded, "pixelfish context initialized");
        Ok(ctx)
    }

    /// Run a final sanity check, then drop the context. A context with no
    /// reference format is unusable for fishing, so this is logged loudly
    /// even though it is not itself an error; there is no persisted state to
    /// reconcile, so `shutdown` never fails.
    pub fn shutdown(self) {
        if self.reference_format.is_none() {
            tracing::warn!("pixelfish context shut down with no reference format registered");
        }
        tracing::info!(
            types = self.types.len(),
            models = self.models.len(),
            formats = self.formats.len(),
            "pixelfish context shut down"
        );
    }

    /// Install a custom allocation strategy, replacing [`SystemAlloc`].
    pub fn with_allocator(mut self, alloc: impl AllocStrategy + 'static) -> Self {
        self.alloc = Box::new(alloc);
        self
    }

    /// The currently installed allocation strategy.
    pub fn allocator(&self) -> &dyn AllocStrategy {
        self.alloc.as_ref()
    }

    /// Install a custom fatal-error hook, called (but not necessarily
    /// fatally) for `InvalidAttributes`, `DuplicateMismatch` and
    /// `AllocFailed` during registration. The default hook panics, treating
    /// these as the programming-bug-class errors they are.
    pub fn set_fatal_hook(&mut self, hook: impl Fn(&Error) + Send + Sync + 'static) {
        self.fatal_hook = Box::new(hook);
    }

    fn fatal(&self, err: Error) -> Error {
        (self.fatal_hook)(&err);
        err
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }

    // --- Type -----------------------------------------------------------

    /// Register a [`Type`]. Idempotent on identical attributes; a second
    /// registration under the same name with different attributes fails.
    pub fn register_type(&mut self, ty: Type) -> Result<TypeRef, Error> {
        ty.validate().map_err(|e| self.fatal(e))?;
        let r = self.types.register(ty).map_err(|e| self.fatal(e))?;
        self.bump_generation();
        Ok(r)
    }

    pub fn type_by_name(&self, name: &str) -> Result<TypeRef, Error> {
        self.types.by_name(name)
    }

    pub fn type_by_id(&self, id: u64) -> Result<TypeRef, Error> {
        self.types.by_raw_id(id)
    }

    pub(crate) fn type_by_ref(&self, r: TypeRef) -> Result<&Type, Error> {
        self.types.by_id(r)
    }

    pub fn iter_types(&self) -> impl Iterator<Item = (TypeRef, &Type)> {
        self.types.iter()
    }

    // --- Component --------------------------------------------------------

    pub fn register_component(&mut self, component: Component) -> Result<ComponentRef, Error> {
        let r = self.components.register(component).map_err(|e| self.fatal(e))?;
        self.bump_generation();
        Ok(r)
    }

    pub fn component_by_name(&self, name: &str) -> Result<ComponentRef, Error> {
        self.components.by_name(name)
    }

    pub fn component_by_id(&self, id: u64) -> Result<ComponentRef, Error> {
        self.components.by_raw_id(id)
    }

    pub(crate) fn component_by_ref(&self, r: ComponentRef) -> Result<&Component, Error> {
        self.components.by_id(r)
    }

    pub fn iter_components(&self) -> impl Iterator<Item = (ComponentRef, &Component)> {
        self.components.iter()
    }

    // --- Model ------------------------------------------------------------

    /// Register a non-reference [`Model`].
    pub fn register_model(
        &mut self,
        name: impl Into<String>,
        components: Vec<ComponentRef>,
    ) -> Result<ModelRef, Error> {
        self.register_model_impl(name.into(), components, false)
    }

    /// Register the single canonical reference model. Exactly one model may
    /// carry this flag, so this fails if one is already registered. A world
    /// built without the built-in registrations (a bare `Context::new()`)
    /// must call this once before any format can serve as a routing hub.
    pub fn register_reference_model(
        &mut self,
        name: impl Into<String>,
        components: Vec<ComponentRef>,
    ) -> Result<ModelRef, Error> {
        self.register_model_impl(name.into(), components, true)
    }

    fn register_model_impl(
        &mut self,
        name: String,
        components: Vec<ComponentRef>,
        is_reference: bool,
    ) -> Result<ModelRef, Error> {
        for c in &components {
            if self.components.get(*c).is_none() {
                return Err(self.fatal(Error::InvalidAttributes {
                    kind: "model",
                    name,
                    reason: "component is not registered in this context".into(),
                }));
            }
        }
        if is_reference && self.reference_model.is_some() {
            return Err(self.fatal(Error::InvalidAttributes {
                kind: "model",
                name,
                reason: "a reference model is already registered".into(),
            }));
        }

        let model = Model {
            name,
            components,
            is_reference,
        };
        let r = self.models.register(model).map_err(|e| self.fatal(e))?;
        if is_reference {
            self.reference_model = Some(r);
        }
        self.bump_generation();
        Ok(r)
    }

    pub fn model_by_name(&self, name: &str) -> Result<ModelRef, Error> {
        self.models.by_name(name)
    }

    pub fn model_by_id(&self, id: u64) -> Result<ModelRef, Error> {
        self.models.by_raw_id(id)
    }

    pub(crate) fn model_by_ref(&self, r: ModelRef) -> Result<&Model, Error> {
        self.models.by_id(r)
    }

    pub fn iter_models(&self) -> impl Iterator<Item = (ModelRef, &Model)> {
        self.models.iter()
    }

    // --- Format -------------------------------------------------------------

    /// Register an interleaved [`Format`], with all components sharing a
    /// single buffer.
    pub fn register_format_interleaved(
        &mut self,
        name: impl Into<String>,
        model: ModelRef,
        ty: TypeRef,
        components: Vec<ComponentRef>,
    ) -> Result<FormatRef, Error> {
        self.register_format(name.into(), model, ty, components, Layout::Interleaved, false)
    }

    /// Register a planar [`Format`], with one plane per component.
    pub fn register_format_planar(
        &mut self,
        name: impl Into<String>,
        model: ModelRef,
        ty: TypeRef,
        components: Vec<ComponentRef>,
    ) -> Result<FormatRef, Error> {
        self.register_format(name.into(), model, ty, components, Layout::Planar, false)
    }

    /// Register the single canonical reference format. Its model must be
    /// the reference model and its type must be floating.
    pub fn register_reference_format(
        &mut self,
        name: impl Into<String>,
        model: ModelRef,
        ty: TypeRef,
        components: Vec<ComponentRef>,
    ) -> Result<FormatRef, Error> {
        self.register_format(name.into(), model, ty, components, Layout::Interleaved, true)
    }

    fn register_format(
        &mut self,
        name: String,
        model: ModelRef,
        ty: TypeRef,
        components: Vec<ComponentRef>,
        layout: Layout,
        is_reference: bool,
    ) -> Result<FormatRef, Error> {
        let model_desc = match self.models.get(model) {
            Some(m) => m.clone(),
            None => {
                return Err(self.fatal(Error::InvalidAttributes {
                    kind: "format",
                    name,
                    reason: "model is not registered in this context".into(),
                }))
            }
        };
        let ty_desc = match self.types.get(ty) {
            Some(t) => t.clone(),
            None => {
                return Err(self.fatal(Error::InvalidAttributes {
                    kind: "format",
                    name,
                    reason: "type is not registered in this context".into(),
                }))
            }
        };

        if let Err(reason) = validate_permutation(&model_desc, &components) {
            return Err(self.fatal(Error::InvalidAttributes {
                kind: "format",
                name,
                reason,
            }));
        }
        if components.is_empty() {
            return Err(self.fatal(Error::InvalidAttributes {
                kind: "format",
                name,
                reason: "a format must have at least one component".into(),
            }));
        }

        if is_reference {
            if !model_desc.is_reference {
                return Err(self.fatal(Error::InvalidAttributes {
                    kind: "format",
                    name,
                    reason: "reference format's model must be the reference model".into(),
                }));
            }
            if !ty_desc.is_floating {
                return Err(self.fatal(Error::InvalidAttributes {
                    kind: "format",
                    name,
                    reason: "reference format's type must be floating".into(),
                }));
            }
            if self.reference_format.is_some() {
                return Err(self.fatal(Error::InvalidAttributes {
                    kind: "format",
                    name,
                    reason: "a reference format is already registered".into(),
                }));
            }
        }

        let bytes_per_pixel = components.len() as u32 * ty_desc.bytes();
        let format = Format {
            name,
            model,
            ty,
            components,
            layout,
            bytes_per_pixel,
            is_reference,
        };
        let r = self.formats.register(format).map_err(|e| self.fatal(e))?;
        if is_reference {
            self.reference_format = Some(r);
            self.reference_type = Some(ty);
        }
        self.bump_generation();
        Ok(r)
    }

    pub fn format_by_name(&self, name: &str) -> Result<FormatRef, Error> {
        self.formats.by_name(name)
    }

    pub fn format_by_id(&self, id: u64) -> Result<FormatRef, Error> {
        self.formats.by_raw_id(id)
    }

    pub(crate) fn format_by_ref(&self, r: FormatRef) -> Result<&Format, Error> {
        self.formats.by_id(r)
    }

    pub fn iter_formats(&self) -> impl Iterator<Item = (FormatRef, &Format)> {
        self.formats.iter()
    }

    /// The single format marked `REFERENCE`, if one has been registered yet.
    pub fn reference_format(&self) -> Option<FormatRef> {
        self.reference_format
    }

    // --- Conversion -------------------------------------------------------

    /// Register a leaf conversion edge. A duplicate `(src, dst)` pair keeps
    /// whichever instance has lower cost, ties broken by "first registered
    /// wins".
    pub fn register_conversion(
        &mut self,
        edge: Edge,
        kernel: Kernel,
        cost: Option<u32>,
    ) -> Result<ConversionRef, Error> {
        self.check_edge_endpoints(edge)?;
        let r = self
            .conversions
            .register(edge, kernel, cost)
            .map_err(|e| self.fatal(e))?;
        self.bump_generation();
        Ok(r)
    }

    fn check_edge_endpoints(&self, edge: Edge) -> Result<(), Error> {
        let missing = |kind: &'static str, id: u64| {
            Error::InvalidAttributes {
                kind: "conversion",
                name: format!("{kind}#{id}"),
                reason: "endpoint is not registered in this context".into(),
            }
        };
        match edge {
            Edge::Type(s, d) => {
                if self.types.get(s).is_none() {
                    return Err(self.fatal(missing("type", s.id())));
                }
                if self.types.get(d).is_none() {
                    return Err(self.fatal(missing("type", d.id())));
                }
            }
            Edge::Model(s, d) => {
                if self.models.get(s).is_none() {
                    return Err(self.fatal(missing("model", s.id())));
                }
                if self.models.get(d).is_none() {
                    return Err(self.fatal(missing("model", d.id())));
                }
            }
            Edge::Format(s, d) => {
                if self.formats.get(s).is_none() {
                    return Err(self.fatal(missing("format", s.id())));
                }
                if self.formats.get(d).is_none() {
                    return Err(self.fatal(missing("format", d.id())));
                }
            }
        }
        Ok(())
    }

    // --- Planning / execution ----------------------------------------------

    /// Find (or build and cache) the conversion [`Plan`] from `src` to
    /// `dst`. Plans are memoized by `(src, dst)`; a cache entry is
    /// invalidated once the registry mutates past the generation the plan
    /// was built under.
    pub fn find_conversion(&self, src: FormatRef, dst: FormatRef) -> Result<Arc<Plan>, Error> {
        let gen = self.generation();
        if let Some(plan) = self.cached(src, dst, gen) {
            tracing::debug!(src = src.id(), dst = dst.id(), "fishing cache hit");
            return Ok(plan);
        }

        let mut cache = self.plan_cache.write().expect("plan cache lock poisoned");
        if let Some(plan) = cache.get(&(src, dst)) {
            if plan.generation == gen {
                return Ok(plan.clone());
            }
        }

        tracing::debug!(src = src.id(), dst = dst.id(), "fishing for a new plan");
        let plan = Arc::new(plan::fish(self, src, dst)?);
        cache.insert((src, dst), plan.clone());
        Ok(plan)
    }

    fn cached(&self, src: FormatRef, dst: FormatRef, gen: u64) -> Option<Arc<Plan>> {
        let cache = self.plan_cache.read().expect("plan cache lock poisoned");
        let plan = cache.get(&(src, dst))?;
        (plan.generation == gen).then(|| plan.clone())
    }
}

/// A format's component list must be a permutation of its model's
/// components: same multiset, any order. Channel add/drop between a format
/// and its own model isn't supported by the fishing planner's reference
/// decomposition, so it is rejected here rather than accepted and later
/// failing to plan.
fn validate_permutation(model: &Model, components: &[ComponentRef]) -> Result<(), String> {
    if components.len() != model.components.len() {
        return Err(format!(
            "format has {} component(s) but model {:?} has {}; a format's components must be a permutation of its model's",
            components.len(),
            model.name,
            model.components.len()
        ));
    }
    let mut available = model.components.clone();
    for c in components {
        match available.iter().position(|have| have == c) {
            Some(pos) => {
                available.remove(pos);
            }
            None => {
                return Err(format!(
                    "component {c:?} is not part of model {:?} (or is used more times than the model has it)",
                    model.name
                ))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> (Context, TypeRef, ComponentRef, ComponentRef, ModelRef) {
        let mut ctx = Context::new();
        let double_ty = ctx
            .register_type(Type {
                name: "double".into(),
                bits: 64,
                is_floating: true,
                min: f64::MIN,
                max: f64::MAX,
                min_val: f64::MIN,
                max_val: f64::MAX,
            })
            .unwrap();
        let r = ctx.register_component(Component::new("R")).unwrap();
        let g = ctx.register_component(Component::new("G")).unwrap();
        let model = ctx.register_reference_model("RG", vec![r, g]).unwrap();
        (ctx, double_ty, r, g, model)
    }

    #[test]
    fn duplicate_type_with_same_attributes_is_idempotent() {
        let (mut ctx, double_ty, ..) = base_ctx();
        let again = ctx
            .register_type(Type {
                name: "double".into(),
                bits: 64,
                is_floating: true,
                min: f64::MIN,
                max: f64::MAX,
                min_val: f64::MIN,
                max_val: f64::MAX,
            })
            .unwrap();
        assert_eq!(double_ty, again);
    }

    #[test]
    fn duplicate_type_with_different_attributes_is_fatal_hook_routed() {
        let (mut ctx, ..) = base_ctx();
        let hit = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let hit2 = hit.clone();
        ctx.set_fatal_hook(move |_| hit2.store(true, Ordering::SeqCst));
        let err = ctx
            .register_type(Type {
                name: "double".into(),
                bits: 32,
                is_floating: true,
                min: 0.0,
                max: 1.0,
                min_val: 0.0,
                max_val: 1.0,
            })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateMismatch { .. }));
        assert!(hit.load(Ordering::SeqCst));
    }

    #[test]
    fn format_with_component_outside_model_is_invalid() {
        let (mut ctx, double_ty, _r, _g, model) = base_ctx();
        ctx.set_fatal_hook(|_| {});
        let stray = ctx.register_component(Component::new("B")).unwrap();
        let err = ctx
            .register_format_interleaved("bad", model, double_ty, vec![stray])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttributes { .. }));
    }

    #[test]
    fn second_reference_format_is_rejected() {
        let (mut ctx, double_ty, r, g, model) = base_ctx();
        ctx.set_fatal_hook(|_| {});
        ctx.register_reference_format("RG-double", model, double_ty, vec![r, g])
            .unwrap();
        let err = ctx
            .register_reference_format("RG-double-2", model, double_ty, vec![r, g])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttributes { .. }));
    }

    #[test]
    fn find_conversion_on_identity_is_zero_edges() {
        let (mut ctx, double_ty, r, g, model) = base_ctx();
        let fmt = ctx
            .register_reference_format("RG-double", model, double_ty, vec![r, g])
            .unwrap();
        let plan = ctx.find_conversion(fmt, fmt).unwrap();
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn find_conversion_is_stable_across_calls() {
        let (mut ctx, double_ty, r, g, model) = base_ctx();
        let fmt = ctx
            .register_reference_format("RG-double", model, double_ty, vec![r, g])
            .unwrap();
        let a = ctx.find_conversion(fmt, fmt).unwrap();
        let b = ctx.find_conversion(fmt, fmt).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unregistered_model_is_invalid_attributes() {
        let (mut ctx, double_ty, r, g, _model) = base_ctx();
        ctx.set_fatal_hook(|_| {});
        let other = Context::new();
        let foreign_model = other.models.iter().next();
        assert!(foreign_model.is_none());
        // Using a raw id that doesn't exist in this context's model table.
        let bogus = ModelRef::from_id(u64::MAX);
        let err = ctx
            .register_format_interleaved("bad", bogus, double_ty, vec![r, g])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAttributes { .. }));
    }
}
