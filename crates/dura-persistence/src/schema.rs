//! Esquema Diesel (escrito a mano, equivalente a `diesel print-schema`).

diesel::table! {
    workflow_executions (id) {
        id -> Text,
        workflow_name -> Text,
        input -> Jsonb,
        status -> Text,
        output -> Nullable<Jsonb>,
        error_detail -> Nullable<Text>,
        recovery_attempts -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        executor_id -> Text,
        input_hash -> Text,
    }
}

diesel::table! {
    workflow_steps (workflow_id, step_number) {
        workflow_id -> Text,
        step_number -> Int4,
        step_name -> Text,
        status -> Text,
        output -> Nullable<Jsonb>,
        error_detail -> Nullable<Text>,
        error_class -> Nullable<Text>,
        attempt_count -> Int4,
        started_at -> Timestamptz,
        completed_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    conversations (id) {
        id -> Uuid,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    messages (id) {
        id -> Uuid,
        conversation_id -> Uuid,
        role -> Text,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(workflow_steps -> workflow_executions (workflow_id));
diesel::joinable!(messages -> conversations (conversation_id));

diesel::allow_tables_to_appear_in_same_query!(workflow_executions, workflow_steps, conversations, messages,);
