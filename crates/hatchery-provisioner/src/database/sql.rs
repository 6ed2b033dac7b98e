// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQL installed into every tenant database project.

/// Schema created right after the project becomes healthy.
pub const BOOTSTRAP_SCHEMA: &str = r#"
CREATE EXTENSION IF NOT EXISTS pg_net WITH SCHEMA extensions;

CREATE TABLE IF NOT EXISTS public.agent_events (
    id BIGSERIAL PRIMARY KEY,
    kind TEXT NOT NULL,
    payload JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_agent_events_created_at ON public.agent_events(created_at);

ALTER TABLE public.agent_events ENABLE ROW LEVEL SECURITY;
"#;

/// Quote a value as a SQL string literal.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL installing the insert trigger that forwards new events to the runtime's hook endpoint.
///
/// Re-running replaces the function and trigger in place.
pub fn hook_trigger_sql(hook_url: &str, hook_token: &str) -> String {
    let url = literal(hook_url);
    let authorization = literal(&format!("Bearer {hook_token}"));

    format!(
        r#"
CREATE OR REPLACE FUNCTION public.notify_agent_hook() RETURNS trigger
LANGUAGE plpgsql SECURITY DEFINER AS $hook$
BEGIN
    PERFORM net.http_post(
        url := {url},
        body := jsonb_build_object('id', NEW.id, 'kind', NEW.kind, 'payload', NEW.payload),
        headers := jsonb_build_object('Content-Type', 'application/json', 'Authorization', {authorization})
    );
    RETURN NEW;
END;
$hook$;

DROP TRIGGER IF EXISTS agent_events_hook ON public.agent_events;
CREATE TRIGGER agent_events_hook
    AFTER INSERT ON public.agent_events
    FOR EACH ROW EXECUTE FUNCTION public.notify_agent_hook();
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_escapes_quotes() {
        assert_eq!(literal("o'brien"), "'o''brien'");
    }

    #[test]
    fn test_hook_trigger_embeds_url_and_token() {
        let sql = hook_trigger_sql("https://alice.agents.example.com/hooks/agent", "tok123");

        assert!(sql.contains("url := 'https://alice.agents.example.com/hooks/agent'"));
        assert!(sql.contains("'Bearer tok123'"));
        assert!(sql.contains("AFTER INSERT ON public.agent_events"));
    }
}
