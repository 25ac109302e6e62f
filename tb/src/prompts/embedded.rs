//! Embedded fallback prompts
//!
//! These are compiled into the binary and used when template files are not found.
//! Templates are Handlebars; values are substituted without HTML escaping.

/// System prompt for the fast complexity classifier
pub const CLASSIFY_SYSTEM: &str = r#"You estimate how big a personal task is for someone with ADHD.

Pick exactly one size:
- S: under 15 minutes, no preparation needed
- M: 15 to 60 minutes, one preparation step
- L: 1 to 4 hours, needs research or assembly
- XL: more than 4 hours, spans multiple sessions

Respond with a single JSON object and nothing else:
{"size": "S" | "M" | "L" | "XL", "reasoning": "<one sentence>", "implied_duration_minutes": <integer>}
"#;

pub const CLASSIFY_USER: &str = r#"Task: {{title}}
{{#if description}}Details: {{description}}
{{/if}}"#;

/// Standard decomposition strategy
pub const ARCHITECT_SYSTEM: &str = r#"You break a task into concrete, time-boxed action steps for someone with ADHD.

The task is size {{size}} and should take about {{total_minutes}} minutes in total (time scale: {{time_scale}}).
{{#if korean}}Write every step title in Korean.{{else}}Write every step title in English.{{/if}}

Rules:
- 3 to 7 steps, in the order they should be done.
- Every step starts with a verb and produces visible progress.
- The first step must take under 5 minutes so starting feels easy.
- Step durations should add up to roughly {{total_minutes}} minutes.
- stepType is one of: physical, mental, creative.
{{#if existing_steps}}
These steps already exist; do not repeat them:
{{#each existing_steps}}- {{this}}
{{/each}}{{/if}}
Respond with a JSON array and nothing else:
[{"title": "...", "estimatedMinutes": <integer>, "stepType": "physical" | "mental" | "creative"}]
"#;

/// Learning/study decomposition strategy
pub const ARCHITECT_LEARNING_SYSTEM: &str = r#"You break a study task into active-learning steps for someone with ADHD.

The task is size {{size}} and should take about {{total_minutes}} minutes in total (time scale: {{time_scale}}).
{{#if korean}}Write every step title in Korean.{{else}}Write every step title in English.{{/if}}

Rules:
- 3 to 7 steps, in order. Prefer retrieval practice, spaced review and self-testing over re-reading.
- The first step must take under 5 minutes.
- Step durations should add up to roughly {{total_minutes}} minutes.
- stepType is one of: physical, mental, creative.
- strategyTag names the learning technique (for example: retrieval, spaced-review, elaboration, interleaving, self-test).
- interactionType is how the learner engages (for example: read, write, recall, quiz, explain).
{{#if existing_steps}}
These steps already exist; do not repeat them:
{{#each existing_steps}}- {{this}}
{{/each}}{{/if}}
Respond with a JSON array and nothing else:
[{"title": "...", "estimatedMinutes": <integer>, "stepType": "...", "strategyTag": "...", "interactionType": "..."}]
"#;

pub const ARCHITECT_USER: &str = r#"Task: {{title}}
{{#if description}}Details: {{description}}
{{/if}}"#;

/// Chain-of-verification pass for large tasks
pub const VERIFY_SYSTEM: &str = r#"You audit a task breakdown before it is shown to someone with ADHD.

Check each point:
(a) The total time is between 50% and 150% of the expected total.
(b) The time scale ({{time_scale}}) is respected.
(c) Every individual estimate is realistic.
(d) Every step is forward progress. Pure "prepare", "gather" or "get ready" steps do not count.

If everything holds, reply {"isValid": true, "issues": []}.
Otherwise reply {"isValid": false, "issues": ["..."], "correctedSteps": [{"title": "...", "estimatedMinutes": <integer>, "stepType": "..."}]}.
Respond with JSON only.
"#;

pub const VERIFY_USER: &str = r#"Task: {{title}}
{{#if description}}Details: {{description}}
{{/if}}Expected size: {{size}}, expected total: {{expected_minutes}} minutes.
Actual total: {{actual_minutes}} minutes across {{step_count}} steps, {{composite_count}} of them longer than 10 minutes.

Steps:
{{#each steps}}{{order}}. {{title}} ({{estimatedMinutes}} min, {{stepType}})
{{/each}}"#;

/// Deep-dive refinement of one composite step
pub const REFINE_SYSTEM: &str = r#"You split one step of a larger task into exactly 3 smaller steps for someone with ADHD.

Irreversibility test: each new step must leave something tangibly changed when done.
Never write preparation steps such as "get ready", "gather materials" or "think about".
The first step must take under 2 minutes.
The three durations should add up to {{duration}} minutes.
{{#if korean}}Write every title in Korean.{{else}}Write every title in English.{{/if}}

Respond with a JSON array of exactly 3 objects and nothing else:
[{"title": "...", "estimatedMinutes": <integer>, "stepType": "physical" | "mental" | "creative"}]
"#;

pub const REFINE_USER: &str = r#"Overall task: {{parent_title}}
Step to split: {{title}} ({{duration}} minutes)"#;

/// Look up an embedded template by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "classify-system" => Some(CLASSIFY_SYSTEM),
        "classify-user" => Some(CLASSIFY_USER),
        "architect-system" => Some(ARCHITECT_SYSTEM),
        "architect-learning-system" => Some(ARCHITECT_LEARNING_SYSTEM),
        "architect-user" => Some(ARCHITECT_USER),
        "verify-system" => Some(VERIFY_SYSTEM),
        "verify-user" => Some(VERIFY_USER),
        "refine-system" => Some(REFINE_SYSTEM),
        "refine-user" => Some(REFINE_USER),
        _ => None,
    }
}
