//! The fixed build plan and the remediation templates shared by both
//! orchestration strategies.

use std::collections::BTreeSet;

use crate::domain::{Step, StepId};

/// Coordinator service that unknown or missing services collapse to.
pub const DEFAULT_SERVICE: &str = "Orchestrator";

/// Title of the step whose failure triggers remediation in the scripted strategy.
pub const VERIFICATION_STEP_TITLE: &str = "Verify Runtime Performance";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTemplate {
    pub title: &'static str,
    pub details: &'static str,
    pub service: &'static str,
}

impl StepTemplate {
    pub fn to_step(&self, id: StepId) -> Step {
        Step::new(id, self.title, self.details, self.service)
    }
}

pub const BASE_PLAN: [StepTemplate; 12] = [
    StepTemplate {
        title: "Parse SaaS Definition",
        details: "Analyzing user requirements and planning execution.",
        service: "Orchestrator",
    },
    StepTemplate {
        title: "Initialize Project",
        details: "Setting up project structure and boilerplate using Filesystem MCP.",
        service: "Filesystem",
    },
    StepTemplate {
        title: "Create GitHub Repository",
        details: "Provisioning a new repository for version control.",
        service: "GitHub",
    },
    StepTemplate {
        title: "Provision Database",
        details: "Defining schema and creating tables with Supabase MCP.",
        service: "Supabase",
    },
    StepTemplate {
        title: "Generate Backend Code",
        details: "Creating Supabase Edge Functions for API endpoints.",
        service: "Orchestrator",
    },
    StepTemplate {
        title: "Generate Frontend Code",
        details: "Building Next.js components and pages based on requirements.",
        service: "Orchestrator",
    },
    StepTemplate {
        title: "Fetch Documentation",
        details: "Using Context 7 to ensure latest syntax and best practices.",
        service: "Context 7",
    },
    StepTemplate {
        title: "Push to GitHub",
        details: "Committing initial application code to the repository.",
        service: "GitHub",
    },
    StepTemplate {
        title: "Deploy to Vercel",
        details: "Connecting GitHub repo and deploying the initial version.",
        service: "Vercel",
    },
    StepTemplate {
        title: "Run Automated Tests",
        details: "Executing user flow simulations with Playwright MCP.",
        service: "Playwright",
    },
    StepTemplate {
        title: VERIFICATION_STEP_TITLE,
        details: "Running Lighthouse audits with Chrome DevTools MCP.",
        service: "Chrome DevTools",
    },
    StepTemplate {
        title: "Finalize Deployment",
        details: "Application successfully built and deployed.",
        service: "Vercel",
    },
];

pub const DIAGNOSIS_STEP: StepTemplate = StepTemplate {
    title: "Diagnose Performance Issue",
    details: "Using Chrome DevTools to analyze LCP issues.",
    service: "Chrome DevTools",
};

pub const FIX_STEP: StepTemplate = StepTemplate {
    title: "Apply Performance Fix",
    details: "Refactoring component to optimize image loading.",
    service: "GitHub",
};

/// The default plan as pending steps with ids `0..n`.
pub fn default_plan() -> Vec<Step> {
    steps_from_templates(&BASE_PLAN)
}

pub fn steps_from_templates(templates: &[StepTemplate]) -> Vec<Step> {
    templates
        .iter()
        .enumerate()
        .map(|(index, template)| template.to_step(index as StepId))
        .collect()
}

/// Services a generated plan may route to: exactly those the default plan uses.
pub fn known_services() -> BTreeSet<&'static str> {
    BASE_PLAN.iter().map(|t| t.service).collect()
}

pub fn is_known_service(service: &str) -> bool {
    BASE_PLAN.iter().any(|t| t.service == service)
}

/// Map a candidate service name onto the known set.
pub fn sanitize_service(service: &str) -> &str {
    if is_known_service(service) {
        service
    } else {
        DEFAULT_SERVICE
    }
}
