use stackforge_core::plan::known_services;

pub struct PlannerPrompts;

impl PlannerPrompts {
    pub fn plan(description: &str) -> String {
        let services = known_services().into_iter().collect::<Vec<_>>().join(", ");

        format!(
            r#"You are an expert SaaS orchestration planner. You will receive a description of a SaaS product that we need to build.
You have access to the following MCP services: {services}.

Respond ONLY with valid JSON matching this schema:
{{
  "steps": [
    {{
      "title": "Short action title",
      "details": "1-2 sentences describing the work that will be executed",
      "service": "One of the allowed services listed above"
    }}
  ]
}}

Rules:
- Provide between 6 and 12 steps that cover planning, implementation, verification, and deployment.
- Choose a service that best fits each step (e.g., "Supabase" for database tasks, "Vercel" for deployment).
- If a step is general coordination, use service "Orchestrator".
- Do not include explanations outside of the JSON.

User description:
{description}"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_prompt_lists_services_and_description() {
        let prompt = PlannerPrompts::plan("A recipe sharing site");

        assert!(prompt.contains("Chrome DevTools, Context 7, Filesystem, GitHub"));
        assert!(prompt.contains("\"steps\": ["));
        assert!(prompt.ends_with("A recipe sharing site"));
    }
}
