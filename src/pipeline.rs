//! The query compiler: wraps a raw collection cursor in the decorator chain a
//! [`Query`] asks for.
//!
//! Stages are applied in a fixed order:
//!
//! 1. sort, over the whole collection, before anything selects rows
//! 2. filter, so paging counts filtered records
//! 3. skip
//! 4. limit
//! 5. view (attribute projection)
//! 6. resample, over the attributes that survived projection
//! 7. reproject, over the smallest stream
//! 8. cache, when prefetching was requested
//!
//! A filter that can never match, or a limit of zero, replaces stages 1-4
//! with an [`EmptyCursor`] and closes the source straight away.

use std::sync::Arc;

use tracing::debug;

use crate::cursor::{
    needs_reprojection, BoxedCursor, CacheCursor, EmptyCursor, FeatureCursor, FilterCursor, LimitCursor,
    ReprojectCursor, ResampleCursor, SkipCursor, SortCursor, ViewCursor,
};
use crate::error::StoreError;
use crate::feature::FeatureType;
use crate::geometry::GeometryTransformer;
use crate::query::Query;
use crate::worker::WorkerPool;

/// Services the compiled chain may need.
#[derive(Clone)]
pub struct PipelineContext {
    pub transformer: Arc<dyn GeometryTransformer>,
    pub pool: Arc<WorkerPool>,
    /// Cache size used when the query's hints defer to the store.
    pub default_prefetch: Option<usize>,
}

/// Wrap `source` so it yields what `query` describes.
///
/// Fails synchronously for malformed queries (unknown sort or property
/// names). The source is closed on failure.
pub fn compile(
    source: BoxedCursor,
    query: &Query,
    ctx: &PipelineContext,
) -> Result<BoxedCursor, StoreError> {
    let mut cursor = source;
    if let Err(err) = validate(cursor.feature_type(), query) {
        cursor.close()?;
        return Err(err);
    }
    let type_name = cursor.feature_type().name().to_string();
    let mut short_circuited = false;

    if !query.sort_by().is_empty() {
        debug!(feature_type = %type_name, keys = query.sort_by().len(), "pipeline: sort (materializes upstream)");
        cursor = Box::new(SortCursor::new(cursor, query.sort_by())?);
    }

    let filter = query.filter().clone().simplify();
    if filter.is_exclude() {
        debug!(feature_type = %type_name, "pipeline: filter excludes everything");
        cursor = empty_in_place(cursor)?;
        short_circuited = true;
    } else if !filter.is_include() {
        debug!(feature_type = %type_name, "pipeline: filter");
        cursor = Box::new(FilterCursor::new(cursor, filter));
    }

    if !short_circuited {
        if let Some(start) = query.start_index().filter(|&n| n > 0) {
            debug!(feature_type = %type_name, start, "pipeline: skip");
            cursor = Box::new(SkipCursor::new(cursor, start));
        }
        match query.max_features() {
            Some(0) => {
                debug!(feature_type = %type_name, "pipeline: limit 0");
                cursor = empty_in_place(cursor)?;
                short_circuited = true;
            }
            Some(max) => {
                debug!(feature_type = %type_name, max, "pipeline: limit");
                cursor = Box::new(LimitCursor::new(cursor, max));
            }
            None => {}
        }
    }

    if let Some(properties) = query.properties() {
        if !cursor.feature_type().is_exactly(properties) {
            debug!(feature_type = %type_name, ?properties, "pipeline: view");
            cursor = Box::new(ViewCursor::new(cursor, properties)?);
        }
    }

    if let Some(resolution) = query.resolution() {
        debug!(feature_type = %type_name, x = resolution.x, y = resolution.y, "pipeline: resample");
        cursor = Box::new(ResampleCursor::new(
            cursor,
            resolution,
            Arc::clone(&ctx.transformer),
        ));
    }

    if let Some(crs) = query.crs() {
        if needs_reprojection(cursor.feature_type(), crs, ctx.transformer.as_ref()) {
            debug!(feature_type = %type_name, crs = %crs, "pipeline: reproject");
            cursor = Box::new(ReprojectCursor::new(
                cursor,
                crs.clone(),
                Arc::clone(&ctx.transformer),
            ));
        }
    }

    if !short_circuited {
        if let Some(size) = query.hints().resolve_prefetch(ctx.default_prefetch) {
            debug!(feature_type = %type_name, size, "pipeline: cache");
            cursor = Box::new(CacheCursor::new(cursor, size, &ctx.pool)?);
        }
    }

    Ok(cursor)
}

/// Close `cursor` and stand an empty cursor of the same type in its place.
fn empty_in_place(mut cursor: BoxedCursor) -> Result<BoxedCursor, StoreError> {
    let feature_type = Arc::clone(cursor.feature_type());
    cursor.close()?;
    Ok(Box::new(EmptyCursor::new(feature_type)))
}

/// Sort keys and requested properties must name attributes of the source.
fn validate(feature_type: &FeatureType, query: &Query) -> Result<(), StoreError> {
    let names = query
        .sort_by()
        .iter()
        .map(|key| key.attribute.as_str())
        .chain(query.properties().unwrap_or_default().iter().map(String::as_str));
    for name in names {
        if feature_type.index_of(name).is_none() {
            return Err(StoreError::UnknownAttribute {
                type_name: feature_type.name().to_string(),
                attribute: name.to_string(),
            });
        }
    }
    Ok(())
}
