//! `26-DivPrev`: division preview sheet.

use async_trait::async_trait;
use tracing::debug;

use merchgen_document::DocumentSession;
use merchgen_shared::Result;

use crate::{DesignContext, DesignTemplate};

/// Team name size in points before print-resolution scaling.
const BASE_FONT_POINTS: f64 = 200.0;

/// Points-to-pixels factor for the 300 ppi canvas.
const RESOLUTION_FACTOR: f64 = 0.24;

/// Widest the team name may render, in pixels.
const MAX_TEXT_WIDTH: f64 = 4000.0;

/// Sizes the team name for the preview sheet and shrinks it to fit
/// [`MAX_TEXT_WIDTH`]. The `BOTTOM` group keeps its authored position, so
/// every entity in a batch lays out against the same baseline.
pub struct DivisionPreview;

#[async_trait]
impl DesignTemplate for DivisionPreview {
    fn id(&self) -> &str {
        "26-DivPrev"
    }

    async fn customize(&self, session: &DocumentSession, ctx: &DesignContext) -> Result<()> {
        // Required by the layout; never moved.
        ctx.require(session, "BOTTOM").await?;

        let size = BASE_FONT_POINTS / RESOLUTION_FACTOR;
        session.set_font_size(ctx.team_name, size).await?;

        let bounds = session.bounds(ctx.team_name).await?;
        if bounds.width() <= MAX_TEXT_WIDTH {
            return Ok(());
        }

        let factor = MAX_TEXT_WIDTH / bounds.width();
        session.set_font_size(ctx.team_name, size * factor).await?;

        debug!(team = %ctx.full_name, factor, "team name shrunk to fit");
        Ok(())
    }
}
