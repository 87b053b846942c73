use minijinja::{context, Environment};

const CLASSIFICATION_SYSTEM_TEMPLATE: &str = include_str!("prompts/classification_system.j2");
const CLASSIFICATION_USER_TEMPLATE: &str = include_str!("prompts/classification_user.j2");

pub struct ClassificationPromptContext<'a> {
    pub platform: &'a str,
    pub customer_name: &'a str,
}

pub fn render_classification_system_prompt(ctx: &ClassificationPromptContext<'_>) -> String {
    let mut env = Environment::new();
    if env
        .add_template("classification_system", CLASSIFICATION_SYSTEM_TEMPLATE)
        .is_err()
    {
        return fallback_system_prompt(ctx);
    }

    let Ok(template) = env.get_template("classification_system") else {
        return fallback_system_prompt(ctx);
    };

    template
        .render(context! {
            platform => ctx.platform,
            customer_name => ctx.customer_name.trim(),
        })
        .unwrap_or_else(|_| fallback_system_prompt(ctx))
}

fn fallback_system_prompt(ctx: &ClassificationPromptContext<'_>) -> String {
    format!(
        "You are the intent-classification engine for a {} customer support channel.\n\
         Reply with one JSON object holding: intent (HUMAN_AGENT_REQUEST | SUPPORT_REQUEST | \
         ORDER_PLACEMENT | GENERAL_QUERY), confidence (0..1), requiresEscalation (boolean), \
         escalationReason (string or null), detectedEntities (productMentions, issueType, \
         urgencyLevel), and response (the reply text).\n\
         An explicit request for a human is HUMAN_AGENT_REQUEST with requiresEscalation true \
         and urgencyLevel high. Never invent facts.\n",
        ctx.platform
    )
}

pub struct ClassificationUserContext<'a> {
    pub kb_context: &'a str,
    pub transcript: &'a str,
    pub visitor_text: &'a str,
}

pub fn render_classification_user_content(ctx: &ClassificationUserContext<'_>) -> String {
    let mut env = Environment::new();
    if env
        .add_template("classification_user", CLASSIFICATION_USER_TEMPLATE)
        .is_err()
    {
        return fallback_user_content(ctx);
    }

    let Ok(template) = env.get_template("classification_user") else {
        return fallback_user_content(ctx);
    };

    template
        .render(context! {
            kb_context => ctx.kb_context.trim(),
            transcript => ctx.transcript.trim(),
            visitor_text => ctx.visitor_text.trim(),
        })
        .unwrap_or_else(|_| fallback_user_content(ctx))
}

fn fallback_user_content(ctx: &ClassificationUserContext<'_>) -> String {
    let mut content = String::new();
    if !ctx.kb_context.trim().is_empty() {
        content.push_str("Knowledge base context:\n");
        content.push_str(ctx.kb_context.trim());
        content.push_str("\n\n");
    }
    if !ctx.transcript.trim().is_empty() {
        content.push_str("Conversation so far:\n");
        content.push_str(ctx.transcript.trim());
        content.push_str("\n\n");
    }
    content.push_str("Customer message:\n");
    content.push_str(ctx.visitor_text.trim());
    content
}
