//! `26-ColorBlock`: team-color footer with mirrored badges.

use async_trait::async_trait;
use tracing::debug;

use merchgen_document::DocumentSession;
use merchgen_shared::{MerchGenError, Result};

use crate::{DesignContext, DesignTemplate};

/// Accent stroke around the color bar.
const ACCENT: &str = "ffffff";

const MIRRORED_BADGE: &str = "BADGE RIGHT";

/// Fills the footer bar with the team color, picks a readable team name
/// color, and mirrors the badge to the opposite side of the bar.
pub struct ColorBlock;

#[async_trait]
impl DesignTemplate for ColorBlock {
    fn id(&self) -> &str {
        "26-ColorBlock"
    }

    async fn customize(&self, session: &DocumentSession, ctx: &DesignContext) -> Result<()> {
        let bottom = ctx.require(session, "BOTTOM").await?;
        let bar = session
            .find_child(Some(bottom), "BAR")
            .await?
            .ok_or_else(|| MerchGenError::Template("BOTTOM group has no \"BAR\" layer".into()))?;

        session.fill_color(bar, &ctx.color).await?;
        session.set_stroke_color(bar, ACCENT).await?;
        session.set_text_color(ctx.team_name, &ctx.color).await?;

        let Some(badge) = session.find_child(Some(bottom), "BADGE").await? else {
            return Ok(());
        };

        let bar_bounds = session.bounds(bar).await?;
        let badge_bounds = session.bounds(badge).await?;
        let margin = badge_bounds.left - bar_bounds.left;
        let target_left = bar_bounds.right - margin - badge_bounds.width();

        // The document is shared across the batch: reuse an earlier entity's copy.
        let mirrored = match session.find_child(Some(bottom), MIRRORED_BADGE).await? {
            Some(existing) => {
                let current = session.bounds(existing).await?;
                let (dx, dy) = (target_left - current.left, badge_bounds.top - current.top);
                if dx != 0.0 || dy != 0.0 {
                    session.translate(existing, dx, dy).await?;
                }
                existing
            }
            None => {
                let dx = target_left - badge_bounds.left;
                session.duplicate(badge, MIRRORED_BADGE, dx, 0.0).await?
            }
        };
        if let Some(label) = session.find_child(Some(mirrored), "BADGE TEXT").await? {
            session.set_text(label, &ctx.abbreviation).await?;
        }

        debug!(team = %ctx.full_name, color = %ctx.color, "color block applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::scene_with_name;

    #[tokio::test]
    async fn mirrors_badge_and_scrubs_copy_names() {
        let (session, ctx) = scene_with_name("RED SOX").await;
        ColorBlock.customize(&session, &ctx).await.unwrap();

        let bottom = ctx.require(&session, "BOTTOM").await.unwrap();
        let names = {
            let mut out = Vec::new();
            for id in session.children(Some(bottom)).await.unwrap() {
                out.push(session.node_name(id).await.unwrap());
            }
            out
        };
        assert_eq!(names, vec!["BAR", "BADGE RIGHT", "BADGE"]);

        let mirrored = session
            .find_child(Some(bottom), "BADGE RIGHT")
            .await
            .unwrap()
            .unwrap();
        let label = session
            .find_child(Some(mirrored), "BADGE TEXT")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.text(label).await.unwrap(), "BOS");

        // Badge is 300px wide, 100px from the left edge; the copy sits 100px
        // from the right edge.
        let bounds = session.bounds(mirrored).await.unwrap();
        assert_eq!(bounds.left, 4500.0 - 100.0 - 300.0);
    }

    #[tokio::test]
    async fn later_entities_reuse_the_mirrored_badge() {
        let (session, ctx) = scene_with_name("RED SOX").await;
        ColorBlock.customize(&session, &ctx).await.unwrap();

        let mut next = ctx.clone();
        next.abbreviation = "NYY".into();
        next.color = "0c2340".into();
        ColorBlock.customize(&session, &next).await.unwrap();

        let bottom = ctx.require(&session, "BOTTOM").await.unwrap();
        let mut names = Vec::new();
        for id in session.children(Some(bottom)).await.unwrap() {
            names.push(session.node_name(id).await.unwrap());
        }
        assert_eq!(names, vec!["BAR", "BADGE RIGHT", "BADGE"]);

        let mirrored = session
            .find_child(Some(bottom), "BADGE RIGHT")
            .await
            .unwrap()
            .unwrap();
        let label = session
            .find_child(Some(mirrored), "BADGE TEXT")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.text(label).await.unwrap(), "NYY");
        assert_eq!(session.bounds(mirrored).await.unwrap().left, 4500.0 - 100.0 - 300.0);
    }

    #[tokio::test]
    async fn missing_bar_is_a_template_error() {
        let (session, ctx) = scene_with_name("RED SOX").await;
        let bottom = ctx.require(&session, "BOTTOM").await.unwrap();
        let bar = session.find_child(Some(bottom), "BAR").await.unwrap().unwrap();
        session.with(|d| d.rename(bar, "STRIPE")).await.unwrap();

        let err = ColorBlock.customize(&session, &ctx).await.unwrap_err();
        assert!(matches!(err, MerchGenError::Template(_)));
    }
}
