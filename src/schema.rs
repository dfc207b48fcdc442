diesel::table! {
    users (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        token -> Text,
    }
}

diesel::table! {
    ingredients (id) {
        id -> Integer,
        name -> Text,
        cost_cents -> BigInt,
        user_id -> Integer,
    }
}

diesel::table! {
    recipes (id) {
        id -> Integer,
        name -> Text,
        description -> Text,
        image -> Nullable<Text>,
        user_id -> Integer,
    }
}

diesel::table! {
    recipe_ingredients (id) {
        id -> Integer,
        recipe_id -> Integer,
        ingredient_id -> Integer,
        amount -> Integer,
    }
}

diesel::joinable!(ingredients -> users (user_id));
diesel::joinable!(recipes -> users (user_id));
diesel::joinable!(recipe_ingredients -> recipes (recipe_id));
diesel::joinable!(recipe_ingredients -> ingredients (ingredient_id));

diesel::allow_tables_to_appear_in_same_query!(ingredients, recipe_ingredients, recipes, users,);
