//! Esquema Diesel (generado manualmente). Reemplazable con
//! `diesel print-schema`.
//!
//! Tablas, en snake_case (ver decisión de casing en el crate raíz):
//! - `state_entry`: una fila por `(tenant_id, run_id, name)`.
//! - `state_status`: puntero al estado actual, una fila por `tenant_id`.

diesel::table! {
    state_entry (id) {
        id -> BigInt,
        tenant_id -> Text,
        run_id -> Text,
        name -> Text,
        start_time -> Timestamptz,
        end_time -> Timestamptz,
        params -> Jsonb,
        visit_count -> Integer,
        errors -> Jsonb,
        yielded -> Bool,
    }
}

diesel::table! {
    state_status (id) {
        id -> BigInt,
        tenant_id -> Text,
        last_state_id -> BigInt,
        update_time -> Timestamptz,
        ref_state_name -> Text,
    }
}

diesel::joinable!(state_status -> state_entry (last_state_id));
diesel::allow_tables_to_appear_in_same_query!(state_entry, state_status,);
