diesel::table! {
    reminders (id) {
        id -> Integer,
        title -> Text,
        body -> Text,
        due_at -> BigInt,
        notified -> Bool,
        alarm_generation -> BigInt,
        created_at -> BigInt,
        updated_at -> BigInt,
    }
}
