table! {
    metrics (id) {
        id -> Integer,
        metric_type -> Text,
        metric_value -> BigInt,
        recorded_at -> Timestamp,
    }
}

table! {
    tickets (id) {
        id -> Integer,
        title -> Text,
        description -> Text,
        category -> Text,
        priority -> Text,
        submitter_email -> Text,
        submitter_name -> Text,
        status -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        assigned_to -> Nullable<Text>,
        resolution_notes -> Nullable<Text>,
    }
}

allow_tables_to_appear_in_same_query!(
    metrics,
    tickets,
);
