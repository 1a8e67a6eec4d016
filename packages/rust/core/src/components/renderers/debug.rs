//! `renderer:debug`: lists generated SLXs on stdout.

use async_trait::async_trait;

use workspacebuilder_shared::Result;
use workspacebuilder_storage::Repository;

use crate::component::{ComponentDependency, ComponentInfo, Renderer};
use crate::context::Context;

static DEPENDENCIES: &[ComponentDependency] = &[ComponentDependency::enricher("workspace")];

pub struct DebugRenderer;

impl ComponentInfo for DebugRenderer {
    fn name(&self) -> &'static str {
        "debug"
    }

    fn documentation(&self) -> &'static str {
        "Prints one `<workspace>: <slx>` line per generated SLX."
    }

    fn dependencies(&self) -> &'static [ComponentDependency] {
        DEPENDENCIES
    }
}

#[async_trait]
impl Renderer for DebugRenderer {
    async fn render(&self, ctx: &Context) -> Result<()> {
        let mut out = String::new();
        for slx in ctx.graph().slxs().all().await? {
            out.push_str(&format!("{}: {}\n", slx.workspace, slx.name));
        }
        ctx.outputter().write_stdout(&out)
    }
}
