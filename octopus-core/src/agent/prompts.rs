//! Agent prompt templates
//!
//! Each role has an embedded task template plus a shared system template.
//! Templates use `{{VARIABLE}}` placeholders rendered from a [`PromptContext`].

use std::collections::HashMap;

use crate::agent::AgentRole;

const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");
const MANAGER_PROMPT: &str = include_str!("prompts/manager.md");
const PLANNER_PROMPT: &str = include_str!("prompts/planner.md");
const REVIEWER_PROMPT: &str = include_str!("prompts/reviewer.md");
const DEVELOPER_PROMPT: &str = include_str!("prompts/developer.md");
const QA_PROMPT: &str = include_str!("prompts/qa.md");
const GIT_SPECIALIST_PROMPT: &str = include_str!("prompts/git_specialist.md");

/// Get the raw task template for a role
pub fn get_template(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Manager => MANAGER_PROMPT,
        AgentRole::Planner => PLANNER_PROMPT,
        AgentRole::Reviewer => REVIEWER_PROMPT,
        AgentRole::Developer => DEVELOPER_PROMPT,
        AgentRole::Qa => QA_PROMPT,
        AgentRole::GitSpecialist => GIT_SPECIALIST_PROMPT,
    }
}

/// Context for rendering a prompt template
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    variables: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set a variable value (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.variables.get(key).map(String::as_str)
    }

    /// Set the pull request number and its details
    pub fn with_pull_request(self, number: u64, details: impl Into<String>) -> Self {
        self.with("PR_NUMBER", number.to_string())
            .with("PR_DETAILS", details)
    }

    /// Set the requirement the pull request implements
    pub fn with_requirement(self, requirement_id: Option<&str>) -> Self {
        match requirement_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.with("REQUIREMENT_ID", id),
            None => self.with("REQUIREMENT_ID", "(none given)"),
        }
    }

    pub fn with_diff(self, diff: impl Into<String>) -> Self {
        let diff = diff.into();
        if diff.trim().is_empty() {
            self.with("DIFF", "(empty diff)")
        } else {
            self.with("DIFF", diff)
        }
    }

    /// Set the repository directory and working branch
    pub fn with_repo(self, repo_dir: impl Into<String>, branch: impl Into<String>) -> Self {
        self.with("REPO_DIR", repo_dir).with("BRANCH", branch)
    }

    /// Set the directory listing
    pub fn with_file_listing(self, listing: impl Into<String>) -> Self {
        self.with("FILE_LISTING", listing)
    }

    /// Set the contents of the files under discussion
    pub fn with_file_contents(self, files: &[(String, String)]) -> Self {
        let contents = if files.is_empty() {
            "(no files)".to_string()
        } else {
            files
                .iter()
                .map(|(path, content)| format!("### `{}`\n\n```\n{}\n```", path, content))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        self.with("FILE_CONTENTS", contents)
    }

    /// Set the outputs of earlier tasks
    pub fn with_context(self, outputs: &[(String, String)]) -> Self {
        let context = if outputs.is_empty() {
            "(no prior work)".to_string()
        } else {
            outputs
                .iter()
                .map(|(task, output)| format!("### {}\n\n{}", task, output))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        self.with("CONTEXT", context)
    }

    /// Describe the team the manager coordinates
    pub fn with_team(self, roles: &[AgentRole]) -> Self {
        let team = roles
            .iter()
            .map(|r| format!("- **{}**: {}", r.title(), r.goal()))
            .collect::<Vec<_>>()
            .join("\n");
        self.with("TEAM", team)
    }

    pub fn with_plan(self, plan: impl Into<String>) -> Self {
        self.with("PLAN", plan)
    }

    /// Set the role identity used by the system template
    pub fn with_role(self, role: AgentRole) -> Self {
        self.with("ROLE_TITLE", role.title())
            .with("GOAL", role.goal())
            .with("BACKSTORY", role.backstory())
    }
}

/// Render a role's task template with the given context
pub fn render(role: AgentRole, context: &PromptContext) -> String {
    render_template(get_template(role), context)
}

/// Render the system prompt for a role
pub fn render_system(role: AgentRole, context: &PromptContext) -> String {
    let context = context.clone().with_role(role);
    render_template(SYSTEM_PROMPT, &context)
}

/// Substitute `{{NAME}}` placeholders in a single pass
///
/// Unset uppercase placeholders become "(not specified)". Substituted values
/// are never rescanned, so braces inside diffs or file contents survive.
fn render_template(template: &str, context: &PromptContext) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) => {
                let name = &after[..end];
                let is_placeholder = !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_uppercase() || c == '_');

                if is_placeholder {
                    result.push_str(context.get(name).unwrap_or("(not specified)"));
                } else {
                    result.push_str(&rest[start..start + 2 + end + 2]);
                }
                rest = &after[end + 2..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    result.push_str(rest);
    result
}

/// Build a complete prompt for a role
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    role: AgentRole,
    context: PromptContext,
    expected_output: Option<String>,
}

impl PromptBuilder {
    pub fn new(role: AgentRole) -> Self {
        Self::with_context(role, PromptContext::new())
    }

    /// Start from an existing context
    pub fn with_context(role: AgentRole, context: PromptContext) -> Self {
        Self {
            role,
            context,
            expected_output: None,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn pull_request(mut self, number: u64, details: impl Into<String>) -> Self {
        self.context = self.context.with_pull_request(number, details);
        self
    }

    /// Set the outputs of earlier tasks
    pub fn prior_work(mut self, outputs: &[(String, String)]) -> Self {
        self.context = self.context.with_context(outputs);
        self
    }

    /// Set a custom variable
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context = self.context.with(key, value);
        self
    }

    /// Close the prompt with an `Expected output:` line
    pub fn expected_output(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    /// Render the system prompt for this role
    pub fn system(&self) -> String {
        render_system(self.role, &self.context)
    }

    /// Build the final task prompt
    pub fn build(&self) -> String {
        let rendered = render(self.role, &self.context);
        match self.expected_output {
            Some(ref expected) => {
                format!("{}\n\nExpected output: {}\n", rendered.trim_end(), expected)
            }
            None => rendered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_template() {
        assert!(get_template(AgentRole::Reviewer).contains("# Code Review"));
        assert!(get_template(AgentRole::Manager).contains("{{DIFF}}"));
        assert!(get_template(AgentRole::Developer).contains("\"edits\""));
    }

    #[test]
    fn test_render_with_variables() {
        let context = PromptContext::new()
            .with_pull_request(7, "{\"title\": \"Add pagination\"}")
            .with_diff("+ return a - b")
            .with_repo("/tmp/apr_x", "pr-7-fix-250101000000");

        let rendered = render(AgentRole::Reviewer, &context);
        assert!(rendered.contains("pull request #7"));
        assert!(rendered.contains("+ return a - b"));
        assert!(rendered.contains("/tmp/apr_x"));
        assert!(rendered.contains("pr-7-fix-250101000000"));
    }

    #[test]
    fn test_render_empty_context() {
        let rendered = render(AgentRole::GitSpecialist, &PromptContext::new());
        assert!(rendered.contains("(not specified)"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_substituted_values_are_not_rescanned() {
        let context = PromptContext::new().with_diff("x = f\"{{BRANCH}}\" + '{{lower}}'");
        let rendered = render(AgentRole::Reviewer, &context);
        assert!(rendered.contains("x = f\"{{BRANCH}}\" + '{{lower}}'"));
    }

    #[test]
    fn test_render_template_keeps_non_placeholders() {
        let context = PromptContext::new().with("NAME", "octopus");
        assert_eq!(
            render_template("{{NAME}} {{not_a_var}} {{MISSING}} {{", &context),
            "octopus {{not_a_var}} (not specified) {{"
        );
    }

    #[test]
    fn test_empty_diff_marker() {
        let context = PromptContext::new().with_diff("  \n");
        assert_eq!(context.get("DIFF"), Some("(empty diff)"));
    }

    #[test]
    fn test_file_contents_and_context() {
        let context = PromptContext::new()
            .with_file_contents(&[("app.py".to_string(), "print(1)".to_string())])
            .with_context(&[]);

        let rendered = render(AgentRole::Qa, &context);
        assert!(rendered.contains("### `app.py`"));
        assert!(rendered.contains("print(1)"));
        assert!(rendered.contains("(no prior work)"));
    }

    #[test]
    fn test_manager_prompt_lists_team() {
        let prompt = PromptBuilder::new(AgentRole::Manager)
            .pull_request(3, "{}")
            .var("PLAN", "1. review")
            .var("TEAM", "")
            .build();
        assert!(prompt.contains("1. review"));

        let team = PromptContext::new().with_team(AgentRole::specialists());
        assert!(team.get("TEAM").unwrap().contains("Senior QA Engineer"));
    }

    #[test]
    fn test_reviewer_prompt_names_requirement() {
        let context = PromptContext::new()
            .with_pull_request(7, "{}")
            .with_requirement(Some(" REQ-1234 "));
        let prompt = PromptBuilder::with_context(AgentRole::Reviewer, context).build();
        assert!(prompt.contains("Requirement ID: REQ-1234\n"));

        let manager = PromptBuilder::with_context(
            AgentRole::Manager,
            PromptContext::new().with_requirement(Some("REQ-9")),
        )
        .build();
        assert!(manager.contains("Requirement ID: REQ-9"));

        let none = PromptContext::new().with_requirement(None);
        assert_eq!(none.get("REQUIREMENT_ID"), Some("(none given)"));
        let blank = PromptContext::new().with_requirement(Some("  "));
        assert_eq!(blank.get("REQUIREMENT_ID"), Some("(none given)"));
    }

    #[test]
    fn test_expected_output_line() {
        let prompt = PromptBuilder::new(AgentRole::GitSpecialist)
            .expected_output("STRICT JSON ONLY")
            .build();
        assert!(prompt.ends_with("\n\nExpected output: STRICT JSON ONLY\n"));
    }

    #[test]
    fn test_system_prompt() {
        let builder = PromptBuilder::new(AgentRole::Developer).pull_request(12, "{}");
        let system = builder.system();
        assert!(system.starts_with("You are Senior Python Developer."));
        assert!(system.contains("pull request #12"));
        assert!(system.contains("Fix bugs reported in the code review"));
    }
}
